//! Bearer-token guard for the admin API.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use subtle::ConstantTimeEq;

/// Admin token settings used by the middleware.
///
/// With no token configured the guard lets every request through.
#[derive(Clone)]
pub struct AdminAuth {
    token: Option<Arc<SecretString>>,
}

impl AdminAuth {
    pub fn new(token: Option<SecretString>) -> Self {
        if token.is_none() {
            tracing::warn!("SOLAR_QUOTE_ADMIN_TOKEN not set; admin API is unauthenticated");
        }
        Self {
            token: token.map(Arc::new),
        }
    }

    pub fn enabled(&self) -> bool {
        self.token.is_some()
    }

    fn allows(&self, candidate: &str) -> bool {
        self.token
            .as_ref()
            .is_some_and(|token| {
                token
                    .expose_secret()
                    .as_bytes()
                    .ct_eq(candidate.as_bytes())
                    .into()
            })
    }
}

/// Middleware enforcing `Authorization: Bearer <token>` when enabled.
pub async fn require_bearer_auth(
    State(auth): State<AdminAuth>,
    req: Request,
    next: Next,
) -> Response {
    if !auth.enabled() {
        return next.run(req).await;
    }

    match extract_bearer_token(req.headers().get(AUTHORIZATION)) {
        Some(token) if auth.allows(token) => next.run(req).await,
        _ => {
            tracing::debug!(path = %req.uri().path(), "Rejected admin request");
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "missing or invalid bearer token" })),
            )
                .into_response()
        }
    }
}

fn extract_bearer_token(value: Option<&HeaderValue>) -> Option<&str> {
    value
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_bearer_token_accepts_valid_header() {
        let header = HeaderValue::from_static("Bearer s3cret");
        assert_eq!(extract_bearer_token(Some(&header)), Some("s3cret"));
    }

    #[test]
    fn extract_bearer_token_rejects_other_schemes() {
        let header = HeaderValue::from_static("Basic abc123");
        assert_eq!(extract_bearer_token(Some(&header)), None);
        let blank = HeaderValue::from_static("Bearer   ");
        assert_eq!(extract_bearer_token(Some(&blank)), None);
        assert_eq!(extract_bearer_token(None), None);
    }

    #[test]
    fn allows_only_configured_token() {
        let auth = AdminAuth::new(Some(SecretString::from("s3cret".to_string())));
        assert!(auth.enabled());
        assert!(auth.allows("s3cret"));
        assert!(!auth.allows("guess"));
        assert!(!auth.allows("s3cre"));
        assert!(!auth.allows("s3cret "));

        let open = AdminAuth::new(None);
        assert!(!open.enabled());
        assert!(!open.allows("anything"));
    }
}
