//! Webhook fan-out: best-effort JSON POST to every active registration.

use std::time::Duration;

use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::WebhookError;
use crate::store::{Database, WebhookRegistration};

/// Outcome counts for one fan-out round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanOutSummary {
    pub attempted: usize,
    pub delivered: usize,
}

/// Posts lead payloads to registered endpoints.
///
/// One attempt per endpoint. Failures are logged and dropped.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    timeout: Duration,
}

impl WebhookNotifier {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }

    /// POST `body` to a single endpoint. Returns the HTTP status on 2xx.
    pub async fn deliver(
        &self,
        hook: &WebhookRegistration,
        body: &Value,
    ) -> Result<u16, WebhookError> {
        let response = self
            .client
            .post(&hook.url)
            .timeout(self.timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    WebhookError::Timeout {
                        name: hook.name.clone(),
                        timeout: self.timeout,
                    }
                } else {
                    WebhookError::RequestFailed {
                        name: hook.name.clone(),
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(WebhookError::BadStatus {
                name: hook.name.clone(),
                status: status.as_u16(),
            });
        }
        Ok(status.as_u16())
    }

    /// Notify every active registration concurrently.
    ///
    /// Registrations are re-read on every call so admin changes apply to the
    /// next lead immediately.
    pub async fn fan_out(&self, db: &dyn Database, body: &Value) -> FanOutSummary {
        let hooks = match db.list_active_webhooks().await {
            Ok(hooks) => hooks,
            Err(e) => {
                warn!(error = %e, "Failed to load active webhooks, skipping fan-out");
                return FanOutSummary::default();
            }
        };
        if hooks.is_empty() {
            debug!("No active webhooks");
            return FanOutSummary::default();
        }

        let results = join_all(hooks.iter().map(|hook| self.deliver(hook, body))).await;

        let mut summary = FanOutSummary {
            attempted: hooks.len(),
            delivered: 0,
        };
        for (hook, result) in hooks.iter().zip(results) {
            match result {
                Ok(status) => {
                    summary.delivered += 1;
                    debug!(webhook_id = %hook.id, status, "Webhook delivered");
                }
                Err(e) => {
                    warn!(webhook_id = %hook.id, url = %hook.url, error = %e, "Webhook delivery failed");
                }
            }
        }
        info!(
            attempted = summary.attempted,
            delivered = summary.delivered,
            "Webhook fan-out finished"
        );
        summary
    }
}
