//! Unified `Database` trait: single async interface for all persistence.

use async_trait::async_trait;
use serde_json::{Map, Value};
use uuid::Uuid;

use super::model::{LeadRecord, WebhookRegistration};
use crate::error::DatabaseError;

/// Backend-agnostic database trait covering leads, webhooks, and settings.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Leads ───────────────────────────────────────────────────────

    /// Store a new lead with a server-assigned id and timestamp, not deleted.
    async fn insert_lead(&self, fields: &Map<String, Value>) -> Result<LeadRecord, DatabaseError>;

    /// Get a lead by ID, whether trashed or not.
    async fn get_lead(&self, id: Uuid) -> Result<Option<LeadRecord>, DatabaseError>;

    /// All leads with the given trash flag, newest first.
    async fn list_leads(&self, deleted: bool) -> Result<Vec<LeadRecord>, DatabaseError>;

    /// Flag a lead as deleted. Returns false if no such lead.
    async fn move_lead_to_trash(&self, id: Uuid) -> Result<bool, DatabaseError>;

    /// Clear a lead's deleted flag. Returns false if no such lead.
    async fn restore_lead_from_trash(&self, id: Uuid) -> Result<bool, DatabaseError>;

    /// Remove a lead for good. Returns false if no such lead.
    async fn delete_lead_permanently(&self, id: Uuid) -> Result<bool, DatabaseError>;

    /// Remove every trashed lead. Returns the number removed.
    async fn empty_trash(&self) -> Result<usize, DatabaseError>;

    // ── Webhooks ────────────────────────────────────────────────────

    /// Register a webhook. New registrations are active.
    async fn create_webhook(
        &self,
        name: &str,
        url: &str,
    ) -> Result<WebhookRegistration, DatabaseError>;

    /// All registrations, oldest first.
    async fn list_webhooks(&self) -> Result<Vec<WebhookRegistration>, DatabaseError>;

    /// Registrations with `active = true`.
    async fn list_active_webhooks(&self) -> Result<Vec<WebhookRegistration>, DatabaseError>;

    /// Set a registration's active flag. Returns false if no such webhook.
    async fn set_webhook_active(&self, id: Uuid, active: bool) -> Result<bool, DatabaseError>;

    /// Delete a registration. Returns false if no such webhook.
    async fn delete_webhook(&self, id: Uuid) -> Result<bool, DatabaseError>;

    // ── Settings ────────────────────────────────────────────────────

    /// Get a settings document by key.
    async fn get_setting(&self, key: &str) -> Result<Option<Value>, DatabaseError>;

    /// Create or replace a settings document.
    async fn set_setting(&self, key: &str, value: &Value) -> Result<(), DatabaseError>;
}
