//! libSQL backend: async `Database` trait implementation.
//!
//! Supports local file and in-memory databases. Lead answers are stored as
//! one JSON document per row so the funnel can grow new fields without a
//! schema change.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use serde_json::{Map, Value};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::model::{LeadRecord, WebhookRegistration};
use crate::store::traits::Database;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }

    async fn query_leads(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
        op: &str,
    ) -> Result<Vec<LeadRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, params)
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;

        let mut leads = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?
        {
            leads.push(row_to_lead(&row)?);
        }
        Ok(leads)
    }

    async fn query_webhooks(
        &self,
        sql: &str,
        op: &str,
    ) -> Result<Vec<WebhookRegistration>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, ())
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;

        let mut hooks = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?
        {
            hooks.push(row_to_webhook(&row).map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?);
        }
        Ok(hooks)
    }

    async fn set_lead_deleted(&self, id: Uuid, deleted: bool, op: &str) -> Result<bool, DatabaseError> {
        let count = self
            .conn()
            .execute(
                "UPDATE quotes SET deleted = ?2 WHERE id = ?1",
                params![id.to_string(), i64::from(deleted)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;
        debug!(lead_id = %id, deleted, found = count > 0, "Lead trash flag updated");
        Ok(count > 0)
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Canonical timestamp format. Fixed precision keeps string order == time order.
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Current time at the precision `format_datetime` stores.
fn stored_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    // Try RFC 3339 first (our canonical write format)
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    // Try SQLite datetime() output
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Map a libsql Row to a LeadRecord.
///
/// Column order matches LEAD_COLUMNS: 0:id, 1:data, 2:created_at, 3:deleted
fn row_to_lead(row: &libsql::Row) -> Result<LeadRecord, DatabaseError> {
    let read = |e: libsql::Error| DatabaseError::Query(format!("read lead row: {e}"));
    let id_str: String = row.get(0).map_err(read)?;
    let data_str: String = row.get(1).map_err(read)?;
    let created_str: String = row.get(2).map_err(read)?;
    let deleted: i64 = row.get(3).map_err(read)?;

    let fields: Map<String, Value> = serde_json::from_str(&data_str)
        .map_err(|e| DatabaseError::Serialization(format!("lead {id_str}: {e}")))?;

    Ok(LeadRecord {
        id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::nil()),
        created_at: parse_datetime(&created_str),
        deleted: deleted != 0,
        fields,
    })
}

/// Map a libsql Row to a WebhookRegistration.
///
/// Column order matches WEBHOOK_COLUMNS: 0:id, 1:name, 2:url, 3:active, 4:created_at
fn row_to_webhook(row: &libsql::Row) -> Result<WebhookRegistration, libsql::Error> {
    let id_str: String = row.get(0)?;
    let active: i64 = row.get(3)?;
    let created_str: String = row.get(4)?;
    Ok(WebhookRegistration {
        id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::nil()),
        name: row.get(1)?,
        url: row.get(2)?,
        active: active != 0,
        created_at: parse_datetime(&created_str),
    })
}

// ── Trait implementation ────────────────────────────────────────────

const LEAD_COLUMNS: &str = "id, data, created_at, deleted";

const WEBHOOK_COLUMNS: &str = "id, name, url, active, created_at";

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Leads ───────────────────────────────────────────────────────

    async fn insert_lead(&self, fields: &Map<String, Value>) -> Result<LeadRecord, DatabaseError> {
        let lead = LeadRecord {
            id: Uuid::new_v4(),
            created_at: stored_now(),
            deleted: false,
            fields: fields.clone(),
        };
        let data = serde_json::to_string(&lead.fields)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        self.conn()
            .execute(
                "INSERT INTO quotes (id, data, created_at, deleted) VALUES (?1, ?2, ?3, 0)",
                params![lead.id.to_string(), data, format_datetime(&lead.created_at)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_lead: {e}")))?;

        debug!(lead_id = %lead.id, fields = lead.fields.len(), "Lead inserted");
        Ok(lead)
    }

    async fn get_lead(&self, id: Uuid) -> Result<Option<LeadRecord>, DatabaseError> {
        let leads = self
            .query_leads(
                &format!("SELECT {LEAD_COLUMNS} FROM quotes WHERE id = ?1"),
                params![id.to_string()],
                "get_lead",
            )
            .await?;
        Ok(leads.into_iter().next())
    }

    async fn list_leads(&self, deleted: bool) -> Result<Vec<LeadRecord>, DatabaseError> {
        self.query_leads(
            &format!(
                "SELECT {LEAD_COLUMNS} FROM quotes WHERE deleted = ?1 \
                 ORDER BY created_at DESC, rowid DESC"
            ),
            params![i64::from(deleted)],
            "list_leads",
        )
        .await
    }

    async fn move_lead_to_trash(&self, id: Uuid) -> Result<bool, DatabaseError> {
        self.set_lead_deleted(id, true, "move_lead_to_trash").await
    }

    async fn restore_lead_from_trash(&self, id: Uuid) -> Result<bool, DatabaseError> {
        self.set_lead_deleted(id, false, "restore_lead_from_trash").await
    }

    async fn delete_lead_permanently(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let count = self
            .conn()
            .execute("DELETE FROM quotes WHERE id = ?1", params![id.to_string()])
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_lead_permanently: {e}")))?;
        Ok(count > 0)
    }

    async fn empty_trash(&self) -> Result<usize, DatabaseError> {
        let count = self
            .conn()
            .execute("DELETE FROM quotes WHERE deleted = 1", ())
            .await
            .map_err(|e| DatabaseError::Query(format!("empty_trash: {e}")))?;
        info!(deleted = count, "Trash emptied");
        Ok(count as usize)
    }

    // ── Webhooks ────────────────────────────────────────────────────

    async fn create_webhook(
        &self,
        name: &str,
        url: &str,
    ) -> Result<WebhookRegistration, DatabaseError> {
        let hook = WebhookRegistration {
            id: Uuid::new_v4(),
            name: name.to_string(),
            url: url.to_string(),
            active: true,
            created_at: stored_now(),
        };

        self.conn()
            .execute(
                "INSERT INTO webhooks (id, name, url, active, created_at) VALUES (?1, ?2, ?3, 1, ?4)",
                params![
                    hook.id.to_string(),
                    hook.name.clone(),
                    hook.url.clone(),
                    format_datetime(&hook.created_at)
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("create_webhook: {e}")))?;

        Ok(hook)
    }

    async fn list_webhooks(&self) -> Result<Vec<WebhookRegistration>, DatabaseError> {
        self.query_webhooks(
            &format!("SELECT {WEBHOOK_COLUMNS} FROM webhooks ORDER BY created_at ASC, rowid ASC"),
            "list_webhooks",
        )
        .await
    }

    async fn list_active_webhooks(&self) -> Result<Vec<WebhookRegistration>, DatabaseError> {
        self.query_webhooks(
            &format!(
                "SELECT {WEBHOOK_COLUMNS} FROM webhooks WHERE active = 1 \
                 ORDER BY created_at ASC, rowid ASC"
            ),
            "list_active_webhooks",
        )
        .await
    }

    async fn set_webhook_active(&self, id: Uuid, active: bool) -> Result<bool, DatabaseError> {
        let count = self
            .conn()
            .execute(
                "UPDATE webhooks SET active = ?2 WHERE id = ?1",
                params![id.to_string(), i64::from(active)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_webhook_active: {e}")))?;
        Ok(count > 0)
    }

    async fn delete_webhook(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let count = self
            .conn()
            .execute("DELETE FROM webhooks WHERE id = ?1", params![id.to_string()])
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_webhook: {e}")))?;
        Ok(count > 0)
    }

    // ── Settings ────────────────────────────────────────────────────

    async fn get_setting(&self, key: &str) -> Result<Option<Value>, DatabaseError> {
        let mut rows = self
            .conn()
            .query("SELECT value FROM settings WHERE key = ?1", params![key])
            .await
            .map_err(|e| DatabaseError::Query(format!("get_setting: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let value_str: String = row.get(0).unwrap_or_else(|_| "null".to_string());
                let value: Value = serde_json::from_str(&value_str).unwrap_or(Value::Null);
                Ok(Some(value))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_setting: {e}"))),
        }
    }

    async fn set_setting(&self, key: &str, value: &Value) -> Result<(), DatabaseError> {
        let now = format_datetime(&Utc::now());
        let value_str =
            serde_json::to_string(value).map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        self.conn()
            .execute(
                "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT (key) DO UPDATE SET value = ?2, updated_at = ?3",
                params![key, value_str, now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_setting: {e}")))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    async fn test_db() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    fn answers(name: &str) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("firstName".into(), json!(name));
        map.insert("monthlyBill".into(), json!(150));
        map
    }

    // ── Lead tests ──────────────────────────────────────────────────

    #[tokio::test]
    async fn insert_and_get_lead() {
        let db = test_db().await;
        let lead = db.insert_lead(&answers("Jane")).await.unwrap();
        assert!(!lead.deleted);

        let fetched = db.get_lead(lead.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, lead.id);
        assert_eq!(fetched.fields["firstName"], "Jane");
        assert_eq!(fetched.fields["monthlyBill"], 150);
        assert_eq!(fetched.created_at, lead.created_at);
    }

    #[tokio::test]
    async fn get_lead_not_found() {
        let db = test_db().await;
        assert!(db.get_lead(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_leads_filters_by_trash_flag_newest_first() {
        let db = test_db().await;
        let a = db.insert_lead(&answers("A")).await.unwrap();
        let b = db.insert_lead(&answers("B")).await.unwrap();
        let c = db.insert_lead(&answers("C")).await.unwrap();

        assert!(db.move_lead_to_trash(b.id).await.unwrap());

        let live = db.list_leads(false).await.unwrap();
        let live_ids: Vec<Uuid> = live.iter().map(|l| l.id).collect();
        assert_eq!(live_ids, vec![c.id, a.id]);

        let trashed = db.list_leads(true).await.unwrap();
        assert_eq!(trashed.len(), 1);
        assert_eq!(trashed[0].id, b.id);
        assert!(trashed[0].deleted);
    }

    #[tokio::test]
    async fn restore_from_trash() {
        let db = test_db().await;
        let lead = db.insert_lead(&answers("Jane")).await.unwrap();
        db.move_lead_to_trash(lead.id).await.unwrap();
        assert!(db.restore_lead_from_trash(lead.id).await.unwrap());

        assert_eq!(db.list_leads(false).await.unwrap().len(), 1);
        assert!(db.list_leads(true).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn trash_unknown_lead_reports_missing() {
        let db = test_db().await;
        assert!(!db.move_lead_to_trash(Uuid::new_v4()).await.unwrap());
        assert!(!db.restore_lead_from_trash(Uuid::new_v4()).await.unwrap());
        assert!(!db.delete_lead_permanently(Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn delete_permanently() {
        let db = test_db().await;
        let lead = db.insert_lead(&answers("Jane")).await.unwrap();
        assert!(db.delete_lead_permanently(lead.id).await.unwrap());
        assert!(db.get_lead(lead.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn empty_trash_counts_only_trashed() {
        let db = test_db().await;
        let keep = db.insert_lead(&answers("Keep")).await.unwrap();
        for name in ["X", "Y"] {
            let lead = db.insert_lead(&answers(name)).await.unwrap();
            db.move_lead_to_trash(lead.id).await.unwrap();
        }

        assert_eq!(db.empty_trash().await.unwrap(), 2);
        assert_eq!(db.empty_trash().await.unwrap(), 0);
        assert!(db.get_lead(keep.id).await.unwrap().is_some());
    }

    // ── Webhook tests ───────────────────────────────────────────────

    #[tokio::test]
    async fn create_webhook_defaults_active() {
        let db = test_db().await;
        let hook = db
            .create_webhook("CRM", "https://crm.example.com/hook")
            .await
            .unwrap();
        assert!(hook.active);

        let all = db.list_webhooks().await.unwrap();
        assert_eq!(all, vec![hook]);
    }

    #[tokio::test]
    async fn active_filter_and_toggle() {
        let db = test_db().await;
        let a = db.create_webhook("A", "https://a.example.com").await.unwrap();
        let b = db.create_webhook("B", "https://b.example.com").await.unwrap();

        assert!(db.set_webhook_active(a.id, false).await.unwrap());
        let active = db.list_active_webhooks().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, b.id);

        assert!(db.set_webhook_active(a.id, true).await.unwrap());
        assert_eq!(db.list_active_webhooks().await.unwrap().len(), 2);
        assert!(!db.set_webhook_active(Uuid::new_v4(), true).await.unwrap());
    }

    #[tokio::test]
    async fn delete_webhook() {
        let db = test_db().await;
        let hook = db.create_webhook("A", "https://a.example.com").await.unwrap();
        assert!(db.delete_webhook(hook.id).await.unwrap());
        assert!(!db.delete_webhook(hook.id).await.unwrap());
        assert!(db.list_webhooks().await.unwrap().is_empty());
    }

    // ── Settings tests ──────────────────────────────────────────────

    #[tokio::test]
    async fn settings_upsert() {
        let db = test_db().await;
        assert!(db.get_setting("gtm").await.unwrap().is_none());

        db.set_setting("gtm", &json!({"headSnippet": "<script>a</script>"}))
            .await
            .unwrap();
        db.set_setting("gtm", &json!({"headSnippet": "<script>b</script>"}))
            .await
            .unwrap();

        let value = db.get_setting("gtm").await.unwrap().unwrap();
        assert_eq!(value["headSnippet"], "<script>b</script>");
    }

    #[tokio::test]
    async fn local_file_persists() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("leads.db");
        let id = {
            let db = LibSqlBackend::new_local(&path).await.unwrap();
            db.insert_lead(&answers("Jane")).await.unwrap().id
        };
        assert!(path.exists());

        let reopened = LibSqlBackend::new_local(&path).await.unwrap();
        assert!(reopened.get_lead(id).await.unwrap().is_some());
    }
}
