//! Restricted-zone endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use utm_core::models::{CreateZoneRequest, RestrictedZone, UpdateZoneRequest, ZoneId};

use crate::api::ApiError;
use crate::state::AppState;

/// Active zones, served from the zone cache.
pub async fn list_zones(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<RestrictedZone>>, ApiError> {
    let zones = state.list_zones(Utc::now()).await?;
    Ok(Json(zones.as_ref().clone()))
}

pub async fn create_zone(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateZoneRequest>,
) -> Result<(StatusCode, Json<RestrictedZone>), ApiError> {
    let zone = state.create_zone(request, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(zone)))
}

pub async fn update_zone(
    State(state): State<Arc<AppState>>,
    Path(zone_id): Path<ZoneId>,
    Json(update): Json<UpdateZoneRequest>,
) -> Result<Json<RestrictedZone>, ApiError> {
    Ok(Json(state.update_zone(zone_id, update, Utc::now()).await?))
}

pub async fn delete_zone(
    State(state): State<Arc<AppState>>,
    Path(zone_id): Path<ZoneId>,
) -> Result<StatusCode, ApiError> {
    state.delete_zone(zone_id, Utc::now()).await?;
    Ok(StatusCode::NO_CONTENT)
}
