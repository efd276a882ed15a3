//! Telemetry ingestion and history.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use utm_core::models::{DroneId, Position, TelemetryData, TelemetryRecord};

use crate::api::{lookback, ApiError};
use crate::state::{AppState, IngestOutcome};

/// Accept one telemetry sample.
pub async fn receive_telemetry(
    State(state): State<Arc<AppState>>,
    Json(record): Json<TelemetryRecord>,
) -> Result<(StatusCode, Json<IngestOutcome>), ApiError> {
    let outcome = state.ingest(record, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_hours")]
    pub hours: u32,
}

fn default_hours() -> u32 {
    1
}

/// Recent samples for one drone, newest first.
pub async fn drone_history(
    State(state): State<Arc<AppState>>,
    Path(drone_id): Path<DroneId>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<TelemetryData>>, ApiError> {
    let since = lookback(Utc::now(), query.hours);
    Ok(Json(state.telemetry_history(drone_id, since).await?))
}

/// Current live position of a tracked drone.
pub async fn current_position(
    State(state): State<Arc<AppState>>,
    Path(drone_id): Path<DroneId>,
) -> Result<Json<Position>, ApiError> {
    Ok(Json(state.current_position(drone_id)?))
}
