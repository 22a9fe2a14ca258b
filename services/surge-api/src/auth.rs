//! Bearer-token gate for inbound requests.
//!
//! Token issuance and validation belong to the deployment's auth
//! collaborator; this layer only compares the presented token against
//! the shared secret from the environment. With no secret configured
//! the gate is open.

use std::sync::Arc;

use axum::{
    extract::Request,
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde_json::json;

use crate::state::AppState;

pub async fn bearer_guard(
    Extension(state): Extension<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = &state.bearer_token else {
        return next.run(request).await;
    };

    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    if authorized(expected, presented) {
        next.run(request).await
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "invalid or missing bearer token"})),
        )
            .into_response()
    }
}

fn authorized(expected: &str, header_value: Option<&str>) -> bool {
    header_value
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|token| token == expected)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matching_token_passes() {
        assert!(authorized("sekrit", Some("Bearer sekrit")));
    }

    #[test]
    fn test_wrong_or_missing_token_fails() {
        assert!(!authorized("sekrit", Some("Bearer wrong")));
        assert!(!authorized("sekrit", Some("sekrit")));
        assert!(!authorized("sekrit", None));
    }
}
