//! Shared library surface for the UTM monitoring server and its tests.

pub mod api;
pub mod backoff;
pub mod config;
pub mod loops;
pub mod persistence;
pub mod state;
