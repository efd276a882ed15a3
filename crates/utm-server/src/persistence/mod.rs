//! Persistence layer for the UTM server.
//!
//! SQLite-backed storage for restricted zones, flight routes, telemetry samples and alerts.
//! Functions return `anyhow::Result`; callers map failures into `UtmError::StoreUnavailable`.

pub mod alerts;
pub mod db;
pub mod routes;
pub mod telemetry;
pub mod zones;

pub use db::{init_database, Database};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};

/// Render a timestamp so that lexical order matches chronological order.
pub(crate) fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn parse_ts(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("invalid timestamp '{}'", value))
}
