//! Mapping of `UtmError` onto HTTP responses.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use utm_core::UtmError;

/// Error returned by handlers; renders as `{"error", "kind"}` JSON.
#[derive(Debug)]
pub struct ApiError(pub UtmError);

impl From<UtmError> for ApiError {
    fn from(err: UtmError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            UtmError::InvalidCoordinate { .. } | UtmError::InvalidCell(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            UtmError::UnknownDrone(_) | UtmError::UnknownZone(_) | UtmError::UnknownAlert(_) => {
                StatusCode::NOT_FOUND
            }
            UtmError::ConflictingRoute { .. } => StatusCode::CONFLICT,
            UtmError::StoreUnavailable(_) | UtmError::Timeout(_) => StatusCode::SERVICE_UNAVAILABLE,
            UtmError::SubscriberUnreachable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut body = json!({
            "error": self.0.to_string(),
            "kind": self.0.kind(),
        });
        if let UtmError::ConflictingRoute { zone_id, route_id } = &self.0 {
            body["zone_id"] = json!(zone_id);
            body["route_id"] = json!(route_id);
        }

        if status.is_server_error() {
            tracing::warn!(kind = self.0.kind(), error = %self.0, "Request failed");
        }

        let mut response = (status, Json(body)).into_response();
        if self.0.is_retryable() {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
        }
        response
    }
}
