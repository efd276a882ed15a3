//! Live-update tick.
//!
//! Once per tick, pushes a batched `telemetry_update` with every drone that reported within
//! the live window. Ticks with no recent positions or no subscribers send nothing.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};

use utm_core::models::LiveEvent;

use crate::state::AppState;

pub async fn run_live_update_loop(state: Arc<AppState>, mut shutdown: broadcast::Receiver<()>) {
    let mut ticker = interval(state.config().tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("Live update loop shutting down");
                break;
            }
            _ = ticker.tick() => {
                if state.broadcaster().subscriber_count() == 0 {
                    continue;
                }
                let snapshot = state.live_snapshot(Utc::now()).await;
                if snapshot.is_empty() {
                    continue;
                }
                let drones = snapshot.len();
                let delivered = state.broadcaster().publish(&LiveEvent::TelemetryUpdate(snapshot));
                tracing::trace!(drones, delivered, "Live update pushed");
            }
        }
    }
}
