//! Background loops for continuous processing.

pub mod live_update_loop;
pub mod staleness_loop;
