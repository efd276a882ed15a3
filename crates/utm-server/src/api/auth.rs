//! Bearer-token guard for administrative endpoints.

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

/// The configured admin token, shared with the middleware.
#[derive(Clone)]
pub struct AdminToken(pub Arc<String>);

/// Requires `Authorization: Bearer <admin_token>`.
pub async fn require_admin(
    State(admin_token): State<AdminToken>,
    request: Request,
    next: Next,
) -> Response {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    match auth_header.map(|auth| auth.strip_prefix("Bearer ")) {
        Some(Some(token)) if token.trim() == admin_token.0.as_str() => next.run(request).await,
        Some(Some(_)) => {
            tracing::warn!(path = %request.uri().path(), "Rejected admin request with bad token");
            (
                StatusCode::FORBIDDEN,
                Json(serde_json::json!({
                    "error": "Invalid admin token",
                    "kind": "forbidden"
                })),
            )
                .into_response()
        }
        Some(None) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "error": "Invalid Authorization header format, expected: Bearer <token>",
                "kind": "bad_request"
            })),
        )
            .into_response(),
        None => (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "error": "Authorization required",
                "kind": "unauthorized"
            })),
        )
            .into_response(),
    }
}
