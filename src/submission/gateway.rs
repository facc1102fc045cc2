//! Submission gateway: persists a finished answer record as a lead.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use super::webhooks::WebhookNotifier;
use crate::error::SubmissionError;
use crate::funnel::record::AnswerRecord;
use crate::store::Database;

/// Identifier and timestamp of a stored lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadReceipt {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Writes leads and triggers the webhook fan-out.
pub struct SubmissionGateway {
    db: Arc<dyn Database>,
    notifier: WebhookNotifier,
}

impl SubmissionGateway {
    pub fn new(db: Arc<dyn Database>, notifier: WebhookNotifier) -> Self {
        Self { db, notifier }
    }

    /// Store the sanitized record, then notify webhooks in the background.
    ///
    /// Only the lead write can fail the call. The fan-out runs on its own
    /// task after the write and its outcome never reaches the caller.
    pub async fn submit(&self, record: &AnswerRecord) -> Result<LeadReceipt, SubmissionError> {
        let fields = record.sanitized();
        let lead = self.db.insert_lead(&fields).await.inspect_err(|e| {
            warn!(session_id = %record.session_id(), error = %e, "Lead write failed");
        })?;

        info!(
            lead_id = %lead.id,
            session_id = %record.session_id(),
            fields = fields.len(),
            "Lead stored"
        );

        let db = Arc::clone(&self.db);
        let notifier = self.notifier.clone();
        let body = Value::Object(fields);
        tokio::spawn(async move {
            notifier.fan_out(db.as_ref(), &body).await;
        });

        Ok(LeadReceipt {
            id: lead.id,
            created_at: lead.created_at,
        })
    }
}
