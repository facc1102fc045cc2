//! REST endpoints driving a funnel session.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use super::controller::Navigation;
use super::session::{AnswerOutcome, FunnelSessions, FunnelView, SubmitOutcome};
use crate::app::ApiError;

/// Shared state for funnel routes.
#[derive(Clone)]
pub struct FunnelRouteState {
    pub sessions: Arc<FunnelSessions>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartRequest {
    address: String,
    property_type: String,
    visitor_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnswerRequest {
    step_id: String,
    #[serde(default)]
    value: Value,
}

/// POST /api/funnel
///
/// Starts a run from the landing-page form and returns the first step.
async fn start_funnel(
    State(state): State<FunnelRouteState>,
    Json(req): Json<StartRequest>,
) -> Result<(StatusCode, Json<FunnelView>), ApiError> {
    let session = state
        .sessions
        .start(&req.address, &req.property_type, req.visitor_id)
        .await?;
    Ok((StatusCode::CREATED, Json(session.view().await)))
}

/// GET /api/funnel/{id}
async fn get_funnel(
    State(state): State<FunnelRouteState>,
    Path(id): Path<Uuid>,
) -> Result<Json<FunnelView>, ApiError> {
    let session = state.sessions.get(id).await?;
    Ok(Json(session.view().await))
}

/// POST /api/funnel/{id}/answer
///
/// Answers the current step. A second contact submission racing the first
/// gets `202 Accepted` and changes nothing.
async fn answer_step(
    State(state): State<FunnelRouteState>,
    Path(id): Path<Uuid>,
    Json(req): Json<AnswerRequest>,
) -> Result<(StatusCode, Json<FunnelView>), ApiError> {
    let session = state.sessions.get(id).await?;
    let outcome = session.answer(&req.step_id, &req.value).await?;
    let status = match outcome {
        AnswerOutcome::Submission(SubmitOutcome::InFlight)
        | AnswerOutcome::Navigated(Navigation::Suspended) => StatusCode::ACCEPTED,
        _ => StatusCode::OK,
    };
    Ok((status, Json(session.view().await)))
}

/// POST /api/funnel/{id}/next
async fn next_step(
    State(state): State<FunnelRouteState>,
    Path(id): Path<Uuid>,
) -> Result<Json<FunnelView>, ApiError> {
    let session = state.sessions.get(id).await?;
    session.advance().await?;
    Ok(Json(session.view().await))
}

/// POST /api/funnel/{id}/back
///
/// Going back from the first step leaves the funnel and forgets the session.
async fn previous_step(
    State(state): State<FunnelRouteState>,
    Path(id): Path<Uuid>,
) -> Result<Json<FunnelView>, ApiError> {
    let session = state.sessions.get(id).await?;
    if session.retreat().await? == Navigation::Exited {
        return Ok(Json(state.sessions.remove(id).await?));
    }
    Ok(Json(session.view().await))
}

/// DELETE /api/funnel/{id}
async fn exit_funnel(
    State(state): State<FunnelRouteState>,
    Path(id): Path<Uuid>,
) -> Result<Json<FunnelView>, ApiError> {
    Ok(Json(state.sessions.remove(id).await?))
}

/// Build the funnel REST routes.
pub fn funnel_routes(state: FunnelRouteState) -> Router {
    Router::new()
        .route("/api/funnel", post(start_funnel))
        .route("/api/funnel/{id}", get(get_funnel).delete(exit_funnel))
        .route("/api/funnel/{id}/answer", post(answer_step))
        .route("/api/funnel/{id}/next", post(next_step))
        .route("/api/funnel/{id}/back", post(previous_step))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::{Body, to_bytes};
    use axum::http::{Request, header};
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;
    use crate::funnel::analytics::MemoryAnalytics;
    use crate::funnel::graph::StepGraph;
    use crate::store::{Database, LibSqlBackend};
    use crate::submission::{SubmissionGateway, WebhookNotifier};

    async fn app() -> Router {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let gateway = Arc::new(SubmissionGateway::new(
            db,
            WebhookNotifier::new(Duration::from_secs(1)),
        ));
        let sessions = FunnelSessions::new(
            StepGraph::default_funnel().unwrap(),
            gateway,
            Arc::new(MemoryAnalytics::new()),
            Duration::from_secs(600),
        );
        funnel_routes(FunnelRouteState { sessions })
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = app
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    async fn start(app: &Router) -> String {
        let (status, view) = send(
            app,
            "POST",
            "/api/funnel",
            Some(json!({"address": "12 Kauri Rd", "propertyType": "RESIDENTIAL"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        view["sessionId"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn start_returns_first_step() {
        let app = app().await;
        let (status, view) = send(
            &app,
            "POST",
            "/api/funnel",
            Some(json!({"address": "12 Kauri Rd", "propertyType": "COMMERCIAL"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(view["step"]["id"], "motivation");
        assert_eq!(view["step"]["kind"], "choice");
        assert_eq!(view["stepIndex"], 0);
        assert_eq!(view["status"], "active");
        assert_eq!(view["answers"]["propertyType"], "COMMERCIAL");
        assert_eq!(view["canGoBack"], true);
    }

    #[tokio::test]
    async fn start_rejects_unknown_property_type() {
        let app = app().await;
        let (status, body) = send(
            &app,
            "POST",
            "/api/funnel",
            Some(json!({"address": "12 Kauri Rd", "propertyType": "BOAT"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("BOAT"));
    }

    #[tokio::test]
    async fn answer_moves_forward_and_validates_options() {
        let app = app().await;
        let id = start(&app).await;
        let uri = format!("/api/funnel/{id}/answer");

        let (status, _) = send(
            &app,
            "POST",
            &uri,
            Some(json!({"stepId": "motivation", "value": "Free money"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, view) = send(
            &app,
            "POST",
            &uri,
            Some(json!({"stepId": "motivation", "value": "The environment"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["step"]["id"], "roofType");
        assert_eq!(view["answers"]["motivation"], "The environment");

        let (status, _) = send(
            &app,
            "POST",
            &uri,
            Some(json!({"stepId": "motivation", "value": "The environment"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn slider_values_are_clamped() {
        let app = app().await;
        let id = start(&app).await;
        let uri = format!("/api/funnel/{id}/answer");
        for (step, value) in [("motivation", json!("The environment")), ("roofType", json!("Tile"))] {
            send(&app, "POST", &uri, Some(json!({"stepId": step, "value": value}))).await;
        }
        let (_, view) = send(&app, "POST", &uri, Some(json!({"stepId": "householdSize", "value": 4}))).await;
        assert_eq!(view["step"]["id"], "monthlyBill");
        assert_eq!(view["step"]["min"], 75);
        assert_eq!(view["step"]["max"], 700);

        let (_, view) = send(&app, "POST", &uri, Some(json!({"stepId": "monthlyBill", "value": 9999}))).await;
        assert_eq!(view["answers"]["monthlyBill"], 700);
        assert_eq!(view["answers"]["savingsPercent"], 47);
        assert_eq!(view["step"]["id"], "analysing");
    }

    #[tokio::test]
    async fn back_from_first_step_exits_and_forgets() {
        let app = app().await;
        let id = start(&app).await;

        let (status, view) = send(&app, "POST", &format!("/api/funnel/{id}/back"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["status"], "exited");

        let (status, _) = send(&app, "GET", &format!("/api/funnel/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_exits_session() {
        let app = app().await;
        let id = start(&app).await;

        let (status, view) = send(&app, "DELETE", &format!("/api/funnel/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["status"], "exited");

        let (status, _) = send(&app, "DELETE", &format!("/api/funnel/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let app = app().await;
        let (status, body) = send(&app, "GET", &format!("/api/funnel/{}", Uuid::new_v4()), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].is_string());
    }
}
