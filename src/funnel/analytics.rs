//! Funnel analytics: events emitted through an injected sink.

use std::sync::Mutex;

use serde::Serialize;
use uuid::Uuid;

/// Something worth telling the tag manager about.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FunnelEvent {
    FunnelStarted {
        session_id: Uuid,
        property_type: String,
    },
    StepViewed {
        session_id: Uuid,
        step_id: String,
        progress: u8,
    },
    StepAnswered {
        session_id: Uuid,
        step_id: String,
    },
    FunnelExited {
        session_id: Uuid,
        step_id: String,
    },
    LeadSubmitted {
        session_id: Uuid,
        lead_id: Uuid,
    },
    SubmissionFailed {
        session_id: Uuid,
        reason: String,
    },
}

/// Receives funnel events. Implementations must not block.
pub trait AnalyticsSink: Send + Sync {
    fn emit(&self, event: FunnelEvent);
}

/// Writes events to the `solar_quote::analytics` tracing target.
#[derive(Debug, Default)]
pub struct TracingAnalytics;

impl AnalyticsSink for TracingAnalytics {
    fn emit(&self, event: FunnelEvent) {
        match serde_json::to_string(&event) {
            Ok(json) => tracing::info!(target: "solar_quote::analytics", event = %json),
            Err(e) => tracing::warn!(target: "solar_quote::analytics", "Unserializable event: {e}"),
        }
    }
}

/// Keeps events in memory, in emission order.
#[derive(Debug, Default)]
pub struct MemoryAnalytics {
    events: Mutex<Vec<FunnelEvent>>,
}

impl MemoryAnalytics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far.
    pub fn events(&self) -> Vec<FunnelEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl AnalyticsSink for MemoryAnalytics {
    fn emit(&self, event: FunnelEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
