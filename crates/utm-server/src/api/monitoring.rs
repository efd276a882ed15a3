//! Monitoring dashboard and pre-flight route check.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use utm_core::models::Waypoint;

use crate::api::ApiError;
use crate::state::{AppState, Dashboard};

pub async fn dashboard(State(state): State<Arc<AppState>>) -> Result<Json<Dashboard>, ApiError> {
    Ok(Json(state.dashboard(Utc::now()).await?))
}

#[derive(Debug, Deserialize)]
pub struct RouteCheckRequest {
    pub waypoints: Vec<Waypoint>,
}

/// Vet a planned route against the active zones.
pub async fn check_route(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RouteCheckRequest>,
) -> Result<Response, ApiError> {
    if request.waypoints.len() < 2 {
        return Ok((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(serde_json::json!({
                "error": "A route needs at least two waypoints",
                "kind": "invalid_route"
            })),
        )
            .into_response());
    }

    let check = state.check_route(&request.waypoints, Utc::now()).await?;
    Ok(Json(check).into_response())
}
