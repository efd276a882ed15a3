//! Alert listing and resolution.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use utm_core::models::{Alert, AlertId};

use crate::api::{lookback, ApiError};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AlertQuery {
    /// Omit to list both resolved and unresolved alerts
    pub resolved: Option<bool>,
    #[serde(default = "default_hours")]
    pub hours: u32,
}

fn default_hours() -> u32 {
    24
}

pub async fn list_alerts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AlertQuery>,
) -> Result<Json<Vec<Alert>>, ApiError> {
    let since = lookback(Utc::now(), query.hours);
    Ok(Json(state.list_alerts(query.resolved, since).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct ResolveRequest {
    pub resolved_by: Option<String>,
}

/// Mark an alert resolved. The body is optional.
pub async fn resolve_alert(
    State(state): State<Arc<AppState>>,
    Path(alert_id): Path<AlertId>,
    body: Option<Json<ResolveRequest>>,
) -> Result<Json<Alert>, ApiError> {
    let resolved_by = body
        .and_then(|Json(req)| req.resolved_by)
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "admin".to_string());

    Ok(Json(state.resolve_alert(alert_id, &resolved_by, Utc::now()).await?))
}
