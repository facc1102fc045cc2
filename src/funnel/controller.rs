//! Funnel controller: walks one answer record through the visible steps.
//!
//! The controller is synchronous and owns no timers. Async concerns
//! (interstitial auto-advance, the submission round-trip) live in
//! [`FunnelSession`](super::session::FunnelSession), which drives this
//! type through a lock.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

use super::analytics::{AnalyticsSink, FunnelEvent};
use super::graph::StepGraph;
use super::record::AnswerRecord;
use super::step::{StepDefinition, StepKind};
use crate::error::FunnelError;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"));

static PHONE_CHARS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9+\-\s()]+$").expect("valid phone regex"));

/// Lifecycle of a funnel run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FunnelStatus {
    Active,
    Completed,
    Exited,
}

impl std::fmt::Display for FunnelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Exited => "exited",
        };
        write!(f, "{s}")
    }
}

/// Result of a navigation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    /// A new step is current.
    Moved { step_id: &'static str },
    /// Advanced past the last step.
    Completed,
    /// Retreated past the first step.
    Exited,
    /// A submission is in flight; the request was ignored.
    Suspended,
}

/// What to do with a contact-step submission.
#[derive(Debug, Clone, PartialEq)]
pub enum ContactHandoff {
    /// Validated; persist this record.
    Ready(AnswerRecord),
    /// Another submission is already in flight.
    InFlight,
    /// This session already produced a lead.
    AlreadySubmitted(Uuid),
}

/// State machine for one funnel run.
pub struct FunnelController {
    graph: StepGraph,
    record: AnswerRecord,
    current_index: usize,
    current_step_id: &'static str,
    is_transitioning: bool,
    status: FunnelStatus,
    generation: u64,
    lead_id: Option<Uuid>,
    analytics: Arc<dyn AnalyticsSink>,
}

impl FunnelController {
    /// Start a run on the first visible step.
    pub fn new(
        graph: StepGraph,
        record: AnswerRecord,
        analytics: Arc<dyn AnalyticsSink>,
    ) -> Result<Self, FunnelError> {
        let first = graph
            .visible_steps(&record)
            .first()
            .map(|s| s.id)
            .ok_or_else(|| FunnelError::InvalidStart("no step applies to this record".into()))?;

        let controller = Self {
            graph,
            record,
            current_index: 0,
            current_step_id: first,
            is_transitioning: false,
            status: FunnelStatus::Active,
            generation: 0,
            lead_id: None,
            analytics,
        };
        controller.analytics.emit(FunnelEvent::FunnelStarted {
            session_id: controller.record.session_id(),
            property_type: controller
                .record
                .property_type()
                .map(|p| p.to_string())
                .unwrap_or_default(),
        });
        controller.emit_step_viewed();
        Ok(controller)
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn record(&self) -> &AnswerRecord {
        &self.record
    }

    pub fn status(&self) -> FunnelStatus {
        self.status
    }

    pub fn graph(&self) -> &StepGraph {
        &self.graph
    }

    pub fn is_transitioning(&self) -> bool {
        self.is_transitioning
    }

    /// Bumped on every navigation; stale timers compare against it.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn lead_id(&self) -> Option<Uuid> {
        self.lead_id
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn visible_steps(&self) -> Vec<&'static StepDefinition> {
        self.graph.visible_steps(&self.record)
    }

    pub fn current_step(&self) -> Option<&'static StepDefinition> {
        self.visible_steps().get(self.current_index).copied()
    }

    /// `round((current_index + 1) / total_visible * 100)`.
    pub fn progress(&self) -> u8 {
        let total = self.visible_steps().len();
        if total == 0 {
            return 100;
        }
        let pct = ((self.current_index + 1) as f64 / total as f64 * 100.0).round();
        pct.clamp(0.0, 100.0) as u8
    }

    /// Interstitial timer to arm for the current step, if any.
    pub fn pending_auto_advance(&self) -> Option<(u64, Duration)> {
        if self.status != FunnelStatus::Active || self.is_transitioning {
            return None;
        }
        let step = self.current_step()?;
        if !step.kind.is_interstitial() {
            return None;
        }
        step.auto_advance_ms
            .map(|ms| (self.generation, Duration::from_millis(ms)))
    }

    // ── Navigation ──────────────────────────────────────────────────

    /// Move forward one visible step; completes the run at the last step.
    pub fn advance(&mut self) -> Result<Navigation, FunnelError> {
        if let Some(nav) = self.guard()? {
            return Ok(nav);
        }
        self.reconcile();

        if let Some(step) = self.current_step() {
            match step.kind {
                StepKind::Contact if self.lead_id.is_none() => {
                    return Err(FunnelError::MissingValue {
                        step_id: step.id.to_string(),
                    });
                }
                StepKind::Slider if self.record.get(step.id).is_none() => {
                    // Advancing an untouched slider confirms its displayed minimum
                    if let Some(bounds) = step.slider {
                        self.record.set(step.id, Value::from(bounds.min));
                    }
                }
                _ => {}
            }
        }

        let visible = self.visible_steps();
        let next = self.current_index + 1;
        self.generation += 1;
        match visible.get(next) {
            Some(step) => {
                self.current_index = next;
                self.current_step_id = step.id;
                self.emit_step_viewed();
                Ok(Navigation::Moved { step_id: step.id })
            }
            None => {
                self.status = FunnelStatus::Completed;
                debug!(session_id = %self.record.session_id(), "Funnel completed");
                Ok(Navigation::Completed)
            }
        }
    }

    /// Move back one visible step; exits the run at the first step.
    pub fn retreat(&mut self) -> Result<Navigation, FunnelError> {
        if let Some(nav) = self.guard()? {
            return Ok(nav);
        }
        self.reconcile();
        self.generation += 1;

        if self.current_index == 0 {
            self.exit();
            return Ok(Navigation::Exited);
        }

        self.current_index -= 1;
        let step = self.visible_steps()[self.current_index];
        self.current_step_id = step.id;
        self.emit_step_viewed();
        Ok(Navigation::Moved { step_id: step.id })
    }

    /// Abandon the run. Nothing is persisted.
    pub fn exit(&mut self) {
        if self.status != FunnelStatus::Active {
            return;
        }
        self.status = FunnelStatus::Exited;
        self.generation += 1;
        self.analytics.emit(FunnelEvent::FunnelExited {
            session_id: self.record.session_id(),
            step_id: self.current_step_id.to_string(),
        });
    }

    /// Fire a timer armed at `expected_generation`. Stale timers do nothing.
    pub fn auto_advance(&mut self, expected_generation: u64) -> Result<Option<Navigation>, FunnelError> {
        match self.pending_auto_advance() {
            Some((generation, _)) if generation == expected_generation => {
                self.advance().map(Some)
            }
            _ => Ok(None),
        }
    }

    // ── Answers ─────────────────────────────────────────────────────

    /// Record a choice and move on.
    pub fn select_and_advance(&mut self, step_id: &str, value: &str) -> Result<Navigation, FunnelError> {
        if let Some(nav) = self.guard()? {
            return Ok(nav);
        }
        let step = self.require_current(step_id, StepKind::Choice)?;
        if !step.options.iter().any(|option| *option == value) {
            return Err(FunnelError::InvalidOption {
                step_id: step.id.to_string(),
                value: value.to_string(),
            });
        }
        self.answer(step, Value::String(value.to_string()));
        self.advance()
    }

    /// Record a slider value, clamped into the step's bounds, and move on.
    pub fn submit_slider(&mut self, step_id: &str, raw: &Value) -> Result<Navigation, FunnelError> {
        if let Some(nav) = self.guard()? {
            return Ok(nav);
        }
        let step = self.require_current(step_id, StepKind::Slider)?;
        let Some(bounds) = step.slider else {
            return Err(FunnelError::WrongKind {
                step_id: step.id.to_string(),
                kind: step.kind.to_string(),
            });
        };
        self.answer(step, Value::from(bounds.clamp(raw)));
        self.advance()
    }

    /// Record free text and move on. Blank optional answers store nothing.
    pub fn submit_text(&mut self, step_id: &str, text: &str) -> Result<Navigation, FunnelError> {
        if let Some(nav) = self.guard()? {
            return Ok(nav);
        }
        let step = self.require_current(step_id, StepKind::Text)?;
        let text = text.trim();
        if text.is_empty() {
            if step.required {
                return Err(FunnelError::MissingValue {
                    step_id: step.id.to_string(),
                });
            }
        } else {
            self.answer(step, Value::String(text.to_string()));
        }
        self.advance()
    }

    /// Validate contact details and hand the record off for persistence.
    ///
    /// On `Ready` the controller is suspended until [`complete_submission`]
    /// or [`abort_submission`] is called.
    ///
    /// [`complete_submission`]: Self::complete_submission
    /// [`abort_submission`]: Self::abort_submission
    pub fn begin_submission(
        &mut self,
        step_id: &str,
        values: &Map<String, Value>,
    ) -> Result<ContactHandoff, FunnelError> {
        if let Some(lead_id) = self.lead_id {
            return Ok(ContactHandoff::AlreadySubmitted(lead_id));
        }
        if self.status != FunnelStatus::Active {
            return Err(FunnelError::Finished {
                status: self.status.to_string(),
            });
        }
        if self.is_transitioning {
            return Ok(ContactHandoff::InFlight);
        }
        let step = self.require_current(step_id, StepKind::Contact)?;
        let cleaned = validate_contact(step, values)?;
        for (field, value) in cleaned {
            self.record.set(field, Value::String(value));
        }
        self.analytics.emit(FunnelEvent::StepAnswered {
            session_id: self.record.session_id(),
            step_id: step.id.to_string(),
        });
        self.is_transitioning = true;
        self.generation += 1;
        Ok(ContactHandoff::Ready(self.record.clone()))
    }

    /// The lead was stored; leave the contact step.
    pub fn complete_submission(&mut self, lead_id: Uuid) -> Result<Navigation, FunnelError> {
        self.is_transitioning = false;
        self.lead_id = Some(lead_id);
        self.analytics.emit(FunnelEvent::LeadSubmitted {
            session_id: self.record.session_id(),
            lead_id,
        });
        self.advance()
    }

    /// The lead could not be stored; stay on the contact step for a retry.
    pub fn abort_submission(&mut self, reason: &str) {
        self.is_transitioning = false;
        self.generation += 1;
        self.analytics.emit(FunnelEvent::SubmissionFailed {
            session_id: self.record.session_id(),
            reason: reason.to_string(),
        });
    }

    // ── Internals ───────────────────────────────────────────────────

    /// Reject input on finished runs; swallow it while suspended.
    fn guard(&self) -> Result<Option<Navigation>, FunnelError> {
        if self.status != FunnelStatus::Active {
            return Err(FunnelError::Finished {
                status: self.status.to_string(),
            });
        }
        if self.is_transitioning {
            return Ok(Some(Navigation::Suspended));
        }
        Ok(None)
    }

    fn require_current(
        &mut self,
        step_id: &str,
        kind: StepKind,
    ) -> Result<&'static StepDefinition, FunnelError> {
        let step = self
            .graph
            .get(step_id)
            .ok_or_else(|| FunnelError::UnknownStep(step_id.to_string()))?;
        self.reconcile();
        if step.id != self.current_step_id {
            return Err(FunnelError::NotCurrentStep {
                step_id: step_id.to_string(),
                current: self.current_step_id.to_string(),
            });
        }
        if step.kind != kind {
            return Err(FunnelError::WrongKind {
                step_id: step.id.to_string(),
                kind: step.kind.to_string(),
            });
        }
        Ok(step)
    }

    fn answer(&mut self, step: &'static StepDefinition, value: Value) {
        self.record.set(step.id, value);
        self.analytics.emit(FunnelEvent::StepAnswered {
            session_id: self.record.session_id(),
            step_id: step.id.to_string(),
        });
        self.reconcile();
    }

    /// Re-locate the current step in the freshly computed visible list,
    /// clamping the index when the step is no longer visible.
    fn reconcile(&mut self) {
        let visible = self.visible_steps();
        if visible.is_empty() {
            self.current_index = 0;
            return;
        }
        if let Some(pos) = visible.iter().position(|s| s.id == self.current_step_id) {
            self.current_index = pos;
            return;
        }
        let clamped = self.current_index.min(visible.len() - 1);
        debug!(
            session_id = %self.record.session_id(),
            vanished = self.current_step_id,
            now = visible[clamped].id,
            "Current step no longer visible, clamping"
        );
        self.current_index = clamped;
        self.current_step_id = visible[clamped].id;
        self.generation += 1;
        self.emit_step_viewed();
    }

    fn emit_step_viewed(&self) {
        self.analytics.emit(FunnelEvent::StepViewed {
            session_id: self.record.session_id(),
            step_id: self.current_step_id.to_string(),
            progress: self.progress(),
        });
    }
}

/// Check every constituent field of a contact step. Returns trimmed values.
fn validate_contact(
    step: &StepDefinition,
    values: &Map<String, Value>,
) -> Result<Vec<(&'static str, String)>, FunnelError> {
    let mut cleaned = Vec::with_capacity(step.fields.len());
    let mut invalid = Vec::new();

    for &field in step.fields {
        let value = values
            .get(field)
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or_default();
        let ok = match field {
            _ if value.is_empty() => false,
            "email" => EMAIL_RE.is_match(value),
            "phone" => {
                let digits = value.chars().filter(char::is_ascii_digit).count();
                PHONE_CHARS_RE.is_match(value) && (7..=15).contains(&digits)
            }
            _ => true,
        };
        if ok {
            cleaned.push((field, value.to_string()));
        } else {
            invalid.push(field.to_string());
        }
    }

    if invalid.is_empty() {
        Ok(cleaned)
    } else {
        Err(FunnelError::InvalidContact { fields: invalid })
    }
}
