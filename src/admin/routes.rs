//! REST endpoints for the admin back office and public site settings.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use secrecy::SecretString;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;
use uuid::Uuid;

use super::auth::{AdminAuth, require_bearer_auth};
use crate::app::ApiError;
use crate::error::WebhookError;
use crate::store::{Database, LeadRecord, SettingKey, WebhookRegistration};

/// Shared state for admin and site routes.
#[derive(Clone)]
pub struct AdminRouteState {
    pub db: Arc<dyn Database>,
}

#[derive(Debug, Deserialize)]
struct LeadsQuery {
    #[serde(default)]
    deleted: bool,
}

#[derive(Debug, Deserialize)]
struct CreateWebhookRequest {
    name: String,
    url: String,
}

#[derive(Debug, Deserialize)]
struct WebhookActiveRequest {
    active: bool,
}

#[derive(Debug, Deserialize)]
struct AssetUrlRequest {
    #[serde(default)]
    url: String,
}

#[derive(Debug, Deserialize)]
struct GtmRequest {
    snippet: String,
}

// ── Validation ──────────────────────────────────────────────────────

/// Absolute http(s) URL with a host.
fn is_web_url(candidate: &str) -> bool {
    reqwest::Url::parse(candidate)
        .map(|url| matches!(url.scheme(), "http" | "https") && url.host_str().is_some())
        .unwrap_or(false)
}

fn validate_webhook(name: &str, url: &str) -> Result<(String, String), WebhookError> {
    let name = name.trim();
    let url = url.trim();
    if name.chars().count() < 2 {
        return Err(WebhookError::InvalidRegistration(
            "name must be at least 2 characters".into(),
        ));
    }
    if !is_web_url(url) {
        return Err(WebhookError::InvalidRegistration(format!(
            "'{url}' is not a valid http(s) URL"
        )));
    }
    Ok((name.to_string(), url.to_string()))
}

/// Branding URLs may be cleared with an empty string.
fn validate_asset_url(url: &str) -> Result<String, ApiError> {
    let url = url.trim();
    if url.is_empty() || is_web_url(url) {
        Ok(url.to_string())
    } else {
        Err(ApiError::bad_request(format!("'{url}' is not a valid http(s) URL")))
    }
}

fn branding_key(raw: &str) -> Result<SettingKey, ApiError> {
    match raw.parse::<SettingKey>() {
        Ok(key @ (SettingKey::LogoUrl | SettingKey::FaviconUrl)) => Ok(key),
        Ok(SettingKey::Gtm) => Err(ApiError::not_found("use /api/admin/gtm for the tag manager snippet")),
        Err(e) => Err(ApiError::not_found(e)),
    }
}

async fn read_setting(db: &dyn Database, key: SettingKey) -> Result<Option<String>, ApiError> {
    Ok(db
        .get_setting(key.as_str())
        .await?
        .and_then(|doc| key.extract(&doc)))
}

async fn write_setting(db: &dyn Database, key: SettingKey, value: &str) -> Result<Value, ApiError> {
    let doc = key.document(value);
    db.set_setting(key.as_str(), &doc).await?;
    info!(key = %key, "Site setting updated");
    Ok(doc)
}

// ── Leads ───────────────────────────────────────────────────────────

/// GET /api/admin/leads?deleted=bool
async fn list_leads(
    State(state): State<AdminRouteState>,
    Query(query): Query<LeadsQuery>,
) -> Result<Json<Vec<LeadRecord>>, ApiError> {
    Ok(Json(state.db.list_leads(query.deleted).await?))
}

fn found_or_404(found: bool, what: &str, id: Uuid) -> Result<StatusCode, ApiError> {
    if found {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(format!("{what} {id} not found")))
    }
}

/// POST /api/admin/leads/{id}/trash
async fn trash_lead(
    State(state): State<AdminRouteState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let found = state.db.move_lead_to_trash(id).await?;
    if found {
        info!(lead_id = %id, "Lead moved to trash");
    }
    found_or_404(found, "lead", id)
}

/// POST /api/admin/leads/{id}/restore
async fn restore_lead(
    State(state): State<AdminRouteState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let found = state.db.restore_lead_from_trash(id).await?;
    found_or_404(found, "lead", id)
}

/// DELETE /api/admin/leads/{id}
async fn delete_lead(
    State(state): State<AdminRouteState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let found = state.db.delete_lead_permanently(id).await?;
    if found {
        info!(lead_id = %id, "Lead permanently deleted");
    }
    found_or_404(found, "lead", id)
}

/// DELETE /api/admin/trash
async fn empty_trash(State(state): State<AdminRouteState>) -> Result<impl IntoResponse, ApiError> {
    let deleted = state.db.empty_trash().await?;
    Ok(Json(json!({ "deletedCount": deleted })))
}

// ── Webhooks ────────────────────────────────────────────────────────

/// GET /api/admin/webhooks
async fn list_webhooks(
    State(state): State<AdminRouteState>,
) -> Result<Json<Vec<WebhookRegistration>>, ApiError> {
    Ok(Json(state.db.list_webhooks().await?))
}

/// POST /api/admin/webhooks
async fn create_webhook(
    State(state): State<AdminRouteState>,
    Json(req): Json<CreateWebhookRequest>,
) -> Result<(StatusCode, Json<WebhookRegistration>), ApiError> {
    let (name, url) = validate_webhook(&req.name, &req.url)?;
    let hook = state.db.create_webhook(&name, &url).await?;
    info!(webhook_id = %hook.id, name = %hook.name, "Webhook registered");
    Ok((StatusCode::CREATED, Json(hook)))
}

/// PUT /api/admin/webhooks/{id}/active
async fn set_webhook_active(
    State(state): State<AdminRouteState>,
    Path(id): Path<Uuid>,
    Json(req): Json<WebhookActiveRequest>,
) -> Result<StatusCode, ApiError> {
    let found = state.db.set_webhook_active(id, req.active).await?;
    if found {
        info!(webhook_id = %id, active = req.active, "Webhook status changed");
    }
    found_or_404(found, "webhook", id)
}

/// DELETE /api/admin/webhooks/{id}
async fn delete_webhook(
    State(state): State<AdminRouteState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let found = state.db.delete_webhook(id).await?;
    found_or_404(found, "webhook", id)
}

// ── Settings ────────────────────────────────────────────────────────

/// GET /api/admin/settings/{key}
async fn get_branding(
    State(state): State<AdminRouteState>,
    Path(key): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let key = branding_key(&key)?;
    let url = read_setting(state.db.as_ref(), key).await?.unwrap_or_default();
    Ok(Json(key.document(&url)))
}

/// PUT /api/admin/settings/{key}
async fn put_branding(
    State(state): State<AdminRouteState>,
    Path(key): Path<String>,
    Json(req): Json<AssetUrlRequest>,
) -> Result<Json<Value>, ApiError> {
    let key = branding_key(&key)?;
    let url = validate_asset_url(&req.url)?;
    Ok(Json(write_setting(state.db.as_ref(), key, &url).await?))
}

/// GET /api/admin/gtm
async fn get_gtm(State(state): State<AdminRouteState>) -> Result<Json<Value>, ApiError> {
    let snippet = read_setting(state.db.as_ref(), SettingKey::Gtm)
        .await?
        .unwrap_or_default();
    Ok(Json(SettingKey::Gtm.document(&snippet)))
}

/// PUT /api/admin/gtm
async fn put_gtm(
    State(state): State<AdminRouteState>,
    Json(req): Json<GtmRequest>,
) -> Result<Json<Value>, ApiError> {
    if req.snippet.trim().is_empty() {
        return Err(ApiError::bad_request("snippet must not be empty"));
    }
    Ok(Json(
        write_setting(state.db.as_ref(), SettingKey::Gtm, &req.snippet).await?,
    ))
}

/// GET /api/site/settings
///
/// Public: the page shell needs the tag manager snippet and branding.
async fn site_settings(State(state): State<AdminRouteState>) -> Result<Json<Value>, ApiError> {
    let db = state.db.as_ref();
    let gtm = read_setting(db, SettingKey::Gtm).await?;
    let logo = read_setting(db, SettingKey::LogoUrl).await?;
    let favicon = read_setting(db, SettingKey::FaviconUrl).await?;
    Ok(Json(json!({
        "gtmHeadSnippet": gtm,
        "logoUrl": logo,
        "faviconUrl": favicon,
    })))
}

/// Build the public site-settings route.
pub fn site_routes(state: AdminRouteState) -> Router {
    Router::new()
        .route("/api/site/settings", get(site_settings))
        .with_state(state)
}

/// Build the admin REST routes behind the bearer guard.
pub fn admin_routes(state: AdminRouteState, token: Option<SecretString>) -> Router {
    Router::new()
        .route("/api/admin/leads", get(list_leads))
        .route("/api/admin/leads/{id}", delete(delete_lead))
        .route("/api/admin/leads/{id}/trash", post(trash_lead))
        .route("/api/admin/leads/{id}/restore", post(restore_lead))
        .route("/api/admin/trash", delete(empty_trash))
        .route("/api/admin/webhooks", get(list_webhooks).post(create_webhook))
        .route("/api/admin/webhooks/{id}", delete(delete_webhook))
        .route("/api/admin/webhooks/{id}/active", put(set_webhook_active))
        .route("/api/admin/settings/{key}", get(get_branding).put(put_branding))
        .route("/api/admin/gtm", get(get_gtm).put(put_gtm))
        .route_layer(axum::middleware::from_fn_with_state(
            AdminAuth::new(token),
            require_bearer_auth,
        ))
        .with_state(state)
}
