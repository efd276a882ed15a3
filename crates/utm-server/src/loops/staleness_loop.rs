//! Staleness sweep.
//!
//! Evicts landed/emergency/disconnected drones that stopped reporting and warns about
//! airborne or hovering drones that went silent. Silent in-flight drones stay tracked.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};

use crate::state::AppState;

pub async fn run_staleness_loop(state: Arc<AppState>, mut shutdown: broadcast::Receiver<()>) {
    let mut ticker = interval(state.config().sweep_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!(
        interval_secs = state.config().sweep_interval.as_secs(),
        retention_secs = state.config().retention.as_secs(),
        "Staleness loop started"
    );

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("Staleness loop shutting down");
                break;
            }
            _ = ticker.tick() => {
                let now = Utc::now();
                let report = state.sweep(now);

                for position in &report.evicted {
                    tracing::info!(
                        drone_id = position.drone_id,
                        status = position.status.as_str(),
                        cell_id = %position.cell_id,
                        last_update = %position.last_update,
                        "Evicted stale drone"
                    );
                }
                for position in &report.silent {
                    tracing::warn!(
                        drone_id = position.drone_id,
                        status = position.status.as_str(),
                        silent_secs = (now - position.last_update).num_seconds(),
                        "In-flight drone stopped reporting"
                    );
                }
            }
        }
    }
}
