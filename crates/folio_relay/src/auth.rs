use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::RelayError;
use crate::state::AppState;

/// Bearer token from the `Authorization` header, if it has one.
fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

/// Rejects the request with 401 unless it carries the configured shared secret. Runs before
/// the body is read, so a rejected caller never reaches the upstream.
pub async fn require_secret(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(expected) = state.config.secret.as_deref() else {
        return next.run(req).await;
    };

    if extract_bearer(req.headers()) != Some(expected) {
        log::warn!("rejecting chat request with a missing or invalid bearer token");
        return RelayError::Unauthorized.into_response();
    }

    next.run(req).await
}
