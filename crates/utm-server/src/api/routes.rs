//! REST API routes.

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;

use crate::api::auth::{self, AdminToken};
use crate::api::{alerts, cells, monitoring, telemetry, ws, zones};
use crate::config::Config;
use crate::state::AppState;

/// Create the API router.
pub fn create_router(config: &Config) -> Router<Arc<AppState>> {
    let admin_token = AdminToken(Arc::new(config.admin_token.clone()));

    let public_routes = Router::new()
        .route("/v1/telemetry", post(telemetry::receive_telemetry))
        .route("/v1/telemetry/:drone_id", get(telemetry::drone_history))
        .route("/v1/drones/:drone_id", get(telemetry::current_position))
        .route("/v1/alerts", get(alerts::list_alerts))
        .route("/v1/monitoring/dashboard", get(monitoring::dashboard))
        .route("/v1/routes/check", post(monitoring::check_route))
        .route("/v1/zones", get(zones::list_zones))
        .route("/v1/ws", get(ws::ws_handler));

    let admin_routes = Router::new()
        .route("/v1/alerts/:alert_id/resolve", put(alerts::resolve_alert))
        .route("/v1/zones", post(zones::create_zone))
        .route(
            "/v1/zones/:zone_id",
            put(zones::update_zone).delete(zones::delete_zone),
        )
        .route("/v1/cells", get(cells::cell_at))
        .route("/v1/cells/:cell_key", get(cells::cell_by_key))
        .layer(middleware::from_fn_with_state(admin_token, auth::require_admin));

    public_routes.merge(admin_routes)
}
