//! HTTP and WebSocket surface of the UTM server.

pub mod alerts;
pub mod auth;
pub mod cells;
pub mod error;
pub mod monitoring;
pub mod request_id;
mod routes;
pub mod telemetry;
pub mod ws;
pub mod zones;

use axum::{middleware, routing::get, Router};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::state::AppState;

pub use error::ApiError;

/// Longest look-back accepted by the `hours` query parameters (one year).
pub const MAX_LOOKBACK_HOURS: u32 = 24 * 365;

/// Start of a look-back window of `hours`, capped at [`MAX_LOOKBACK_HOURS`].
pub(crate) fn lookback(now: DateTime<Utc>, hours: u32) -> DateTime<Utc> {
    now - Duration::hours(i64::from(hours.min(MAX_LOOKBACK_HOURS)))
}

pub fn routes(config: &Config) -> Router<Arc<AppState>> {
    routes::create_router(config)
}

/// The complete application: routes, health check, state and middleware.
pub fn app(state: Arc<AppState>) -> Router {
    routes(state.config())
        .route("/health", get(|| async { "OK" }))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(request_id::ensure_request_id))
        .layer(CorsLayer::permissive())
}
