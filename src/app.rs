//! HTTP application: error mapping, health check and the merged router.

use std::sync::Arc;

use axum::http::{Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use secrecy::SecretString;
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};

use crate::admin::routes::{AdminRouteState, admin_routes, site_routes};
use crate::error::{DatabaseError, Error, FunnelError, SubmissionError, WebhookError};
use crate::funnel::FunnelSessions;
use crate::funnel::routes::{FunnelRouteState, funnel_routes};
use crate::store::Database;

/// JSON error response: `{"error": message}` with a mapped status.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<FunnelError> for ApiError {
    fn from(e: FunnelError) -> Self {
        let status = match &e {
            FunnelError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            FunnelError::Finished { .. } => StatusCode::CONFLICT,
            FunnelError::InvalidGraph(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        };
        Self::new(status, e.to_string())
    }
}

impl From<DatabaseError> for ApiError {
    fn from(e: DatabaseError) -> Self {
        tracing::error!(error = %e, "Database operation failed");
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "storage unavailable")
    }
}

impl From<SubmissionError> for ApiError {
    fn from(e: SubmissionError) -> Self {
        tracing::error!(error = %e, "Lead submission failed");
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "Your quote could not be saved, please try again",
        )
    }
}

impl From<WebhookError> for ApiError {
    fn from(e: WebhookError) -> Self {
        match e {
            WebhookError::InvalidRegistration(_) => Self::bad_request(e.to_string()),
            other => Self::new(StatusCode::BAD_GATEWAY, other.to_string()),
        }
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        match e {
            Error::Funnel(e) => e.into(),
            Error::Submission(e) => e.into(),
        }
    }
}

/// Everything the router needs.
pub struct AppDeps {
    pub db: Arc<dyn Database>,
    pub sessions: Arc<FunnelSessions>,
    pub admin_token: Option<SecretString>,
}

/// GET /health
async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

/// Build the full service: public funnel, site settings and admin API.
pub fn build_app(deps: AppDeps) -> Router {
    let funnel = funnel_routes(FunnelRouteState {
        sessions: deps.sessions,
    });
    let admin_state = AdminRouteState {
        db: Arc::clone(&deps.db),
    };

    Router::new()
        .route("/health", get(health))
        .merge(funnel)
        .merge(site_routes(admin_state.clone()))
        .merge(admin_routes(admin_state, deps.admin_token))
        .layer(ServiceBuilder::new().layer(build_cors()))
}
