//! Hex-cell queries (administrative).

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use utm_core::models::CellKey;

use crate::api::ApiError;
use crate::state::{AppState, CellDetail};

pub async fn cell_by_key(
    State(state): State<Arc<AppState>>,
    Path(cell_key): Path<String>,
) -> Result<Json<CellDetail>, ApiError> {
    Ok(Json(state.cell_by_key(&CellKey(cell_key))?))
}

#[derive(Debug, Deserialize)]
pub struct CellAtQuery {
    pub lat: f64,
    pub lon: f64,
}

pub async fn cell_at(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CellAtQuery>,
) -> Result<Json<CellDetail>, ApiError> {
    Ok(Json(state.cell_at(query.lat, query.lon)?))
}
