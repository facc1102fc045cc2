//! Funnel sessions: async wrapper around [`FunnelController`].
//!
//! Each session owns its controller behind a lock, the interstitial timer
//! and the contact-submission round-trip. [`FunnelSessions`] is the
//! in-process registry keyed by session id.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::analytics::AnalyticsSink;
use super::controller::{ContactHandoff, FunnelController, FunnelStatus, Navigation};
use super::graph::StepGraph;
use super::record::{AnswerRecord, PropertyType};
use super::step::{StepDefinition, StepKind};
use crate::error::{Error, FunnelError};
use crate::submission::{LeadReceipt, SubmissionGateway};

/// Result of a contact-step submission.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// A lead was stored by this call.
    Submitted(LeadReceipt),
    /// Another call is already persisting this session; ignored.
    InFlight,
    /// The session already produced this lead; nothing was written.
    AlreadySubmitted(Uuid),
}

/// Result of answering the current step.
#[derive(Debug, Clone, PartialEq)]
pub enum AnswerOutcome {
    Navigated(Navigation),
    Submission(SubmitOutcome),
}

/// Client-facing description of one step.
#[derive(Debug, Clone, Serialize)]
pub struct StepView {
    pub id: &'static str,
    pub kind: StepKind,
    pub title: String,
    pub options: &'static [&'static str],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<i64>,
    pub fields: &'static [&'static str],
}

impl StepView {
    fn new(step: &StepDefinition, record: &AnswerRecord) -> Self {
        Self {
            id: step.id,
            kind: step.kind,
            title: step.render_title(record),
            options: step.options,
            min: step.slider.map(|b| b.min),
            max: step.slider.map(|b| b.max),
            step: step.slider.map(|b| b.step),
            fields: step.fields,
        }
    }
}

/// Snapshot of a session returned by every funnel endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunnelView {
    pub session_id: Uuid,
    pub visitor_id: Uuid,
    pub step: Option<StepView>,
    pub step_index: usize,
    pub total_steps: usize,
    pub progress: u8,
    pub answers: Map<String, Value>,
    pub can_go_back: bool,
    pub status: FunnelStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lead_id: Option<Uuid>,
}

impl FunnelView {
    fn of(session_id: Uuid, controller: &FunnelController) -> Self {
        let record = controller.record();
        let active = controller.status() == FunnelStatus::Active;
        Self {
            session_id,
            visitor_id: record.session_id(),
            step: controller.current_step().map(|s| StepView::new(s, record)),
            step_index: controller.current_index(),
            total_steps: controller.visible_steps().len(),
            progress: controller.progress(),
            answers: record.sanitized(),
            can_go_back: active && !controller.is_transitioning(),
            status: controller.status(),
            lead_id: controller.lead_id(),
        }
    }
}

/// One browser's run through the funnel.
pub struct FunnelSession {
    id: Uuid,
    controller: Arc<Mutex<FunnelController>>,
    timer: Mutex<Option<JoinHandle<()>>>,
    last_activity: Mutex<Instant>,
    gateway: Arc<SubmissionGateway>,
}

impl FunnelSession {
    pub fn new(controller: FunnelController, gateway: Arc<SubmissionGateway>) -> Self {
        Self {
            id: Uuid::new_v4(),
            controller: Arc::new(Mutex::new(controller)),
            timer: Mutex::new(None),
            last_activity: Mutex::new(Instant::now()),
            gateway,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub async fn view(&self) -> FunnelView {
        let controller = self.controller.lock().await;
        FunnelView::of(self.id, &controller)
    }

    pub async fn status(&self) -> FunnelStatus {
        self.controller.lock().await.status()
    }

    /// Time since the last client request.
    pub async fn idle_for(&self) -> Duration {
        self.last_activity.lock().await.elapsed()
    }

    /// Arm the timer for the first step, if it is an interstitial.
    pub async fn arm(&self) {
        let controller = self.controller.lock().await;
        self.rearm(&controller).await;
    }

    pub async fn advance(&self) -> Result<Navigation, FunnelError> {
        self.navigate(FunnelController::advance).await
    }

    pub async fn retreat(&self) -> Result<Navigation, FunnelError> {
        self.navigate(FunnelController::retreat).await
    }

    /// Abandon the run. Nothing is persisted.
    pub async fn exit(&self) {
        let mut controller = self.controller.lock().await;
        controller.exit();
        self.rearm(&controller).await;
    }

    /// Answer a step according to its kind.
    ///
    /// Contact steps submit the lead, and repeat that answer after a lead is
    /// stored. Every other kind records the value and moves on.
    pub async fn answer(&self, step_id: &str, value: &Value) -> Result<AnswerOutcome, Error> {
        self.touch().await;
        let kind = {
            let controller = self.controller.lock().await;
            controller.graph().get(step_id).map(|s| s.kind)
        };

        if kind == Some(StepKind::Contact) {
            let values = value.as_object().cloned().unwrap_or_default();
            return self
                .submit_contact(step_id, &values)
                .await
                .map(AnswerOutcome::Submission);
        }

        let mut controller = self.controller.lock().await;
        let nav = match kind {
            Some(StepKind::Slider) => controller.submit_slider(step_id, value),
            Some(StepKind::Text) => {
                let text = match value {
                    Value::Null => String::new(),
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                controller.submit_text(step_id, &text)
            }
            _ => match value.as_str() {
                Some(choice) => controller.select_and_advance(step_id, choice),
                None => Err(FunnelError::InvalidOption {
                    step_id: step_id.to_string(),
                    value: value.to_string(),
                }),
            },
        }?;
        self.rearm(&controller).await;
        Ok(AnswerOutcome::Navigated(nav))
    }

    /// Validate contact details and persist the lead, at most once.
    ///
    /// The controller lock is released while the lead is written, so a
    /// concurrent call observes the in-flight flag and returns `InFlight`.
    pub async fn submit_contact(
        &self,
        step_id: &str,
        values: &Map<String, Value>,
    ) -> Result<SubmitOutcome, Error> {
        self.touch().await;
        let record = {
            let mut controller = self.controller.lock().await;
            let handoff = controller.begin_submission(step_id, values)?;
            self.rearm(&controller).await;
            match handoff {
                ContactHandoff::Ready(record) => record,
                ContactHandoff::InFlight => {
                    debug!(session_id = %self.id, "Submission already in flight, ignoring");
                    return Ok(SubmitOutcome::InFlight);
                }
                ContactHandoff::AlreadySubmitted(lead_id) => {
                    return Ok(SubmitOutcome::AlreadySubmitted(lead_id));
                }
            }
        };

        let result = self.gateway.submit(&record).await;

        let mut controller = self.controller.lock().await;
        match result {
            Ok(receipt) => {
                controller.complete_submission(receipt.id)?;
                self.rearm(&controller).await;
                info!(session_id = %self.id, lead_id = %receipt.id, "Funnel lead submitted");
                Ok(SubmitOutcome::Submitted(receipt))
            }
            Err(e) => {
                controller.abort_submission(&e.to_string());
                self.rearm(&controller).await;
                Err(e.into())
            }
        }
    }

    async fn navigate(
        &self,
        op: fn(&mut FunnelController) -> Result<Navigation, FunnelError>,
    ) -> Result<Navigation, FunnelError> {
        self.touch().await;
        let mut controller = self.controller.lock().await;
        let nav = op(&mut controller)?;
        self.rearm(&controller).await;
        Ok(nav)
    }

    async fn touch(&self) {
        *self.last_activity.lock().await = Instant::now();
    }

    /// Replace the pending timer with one for the current step, if any.
    ///
    /// Called with the controller lock held so the armed generation matches
    /// the state just produced.
    async fn rearm(&self, controller: &FunnelController) {
        let mut timer = self.timer.lock().await;
        if let Some(handle) = timer.take() {
            handle.abort();
        }
        if let Some(pending) = controller.pending_auto_advance() {
            *timer = Some(spawn_auto_advance(self.id, Arc::clone(&self.controller), pending));
        }
    }
}

impl Drop for FunnelSession {
    fn drop(&mut self) {
        if let Some(handle) = self.timer.get_mut().take() {
            handle.abort();
        }
    }
}

/// Fire interstitial auto-advances until a non-interstitial step is current.
///
/// Each wake-up re-checks the generation, so a timer that lost a race with a
/// user navigation does nothing.
fn spawn_auto_advance(
    session_id: Uuid,
    controller: Arc<Mutex<FunnelController>>,
    pending: (u64, Duration),
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut next = Some(pending);
        while let Some((generation, delay)) = next {
            tokio::time::sleep(delay).await;
            let mut controller = controller.lock().await;
            match controller.auto_advance(generation) {
                Ok(Some(nav)) => debug!(%session_id, ?nav, "Interstitial auto-advanced"),
                Ok(None) => {
                    debug!(%session_id, generation, "Stale interstitial timer");
                    return;
                }
                Err(e) => {
                    warn!(%session_id, error = %e, "Interstitial auto-advance failed");
                    return;
                }
            }
            next = controller.pending_auto_advance();
        }
    })
}

/// Registry of live funnel sessions.
pub struct FunnelSessions {
    sessions: RwLock<HashMap<Uuid, Arc<FunnelSession>>>,
    graph: StepGraph,
    gateway: Arc<SubmissionGateway>,
    analytics: Arc<dyn AnalyticsSink>,
    idle_timeout: Duration,
}

impl FunnelSessions {
    pub fn new(
        graph: StepGraph,
        gateway: Arc<SubmissionGateway>,
        analytics: Arc<dyn AnalyticsSink>,
        idle_timeout: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            sessions: RwLock::new(HashMap::new()),
            graph,
            gateway,
            analytics,
            idle_timeout,
        })
    }

    /// Start a run from the landing-page form.
    ///
    /// `visitor_id` is the browser's persistent id; a fresh one is minted
    /// when the browser has none.
    pub async fn start(
        &self,
        address: &str,
        property_type: &str,
        visitor_id: Option<Uuid>,
    ) -> Result<Arc<FunnelSession>, FunnelError> {
        let property_type: PropertyType = property_type.parse()?;
        let visitor_id = visitor_id.unwrap_or_else(Uuid::new_v4);
        let record = AnswerRecord::start(visitor_id, address, property_type)?;
        let controller =
            FunnelController::new(self.graph.clone(), record, Arc::clone(&self.analytics))?;

        let session = Arc::new(FunnelSession::new(controller, Arc::clone(&self.gateway)));
        session.arm().await;
        self.sessions
            .write()
            .await
            .insert(session.id(), Arc::clone(&session));

        info!(
            session_id = %session.id(),
            %visitor_id,
            property_type = %property_type,
            "Funnel session started"
        );
        Ok(session)
    }

    pub async fn get(&self, id: Uuid) -> Result<Arc<FunnelSession>, FunnelError> {
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| FunnelError::SessionNotFound(id.to_string()))
    }

    /// Exit and forget a session. Returns its final view.
    pub async fn remove(&self, id: Uuid) -> Result<FunnelView, FunnelError> {
        let session = self
            .sessions
            .write()
            .await
            .remove(&id)
            .ok_or_else(|| FunnelError::SessionNotFound(id.to_string()))?;
        session.exit().await;
        debug!(session_id = %id, "Funnel session removed");
        Ok(session.view().await)
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Drop sessions idle longer than the configured timeout.
    pub async fn expire_idle(&self) -> usize {
        let snapshot: Vec<Arc<FunnelSession>> =
            self.sessions.read().await.values().cloned().collect();

        let mut stale = Vec::new();
        for session in snapshot {
            if session.idle_for().await >= self.idle_timeout {
                stale.push(session.id());
            }
        }
        if stale.is_empty() {
            return 0;
        }

        let mut sessions = self.sessions.write().await;
        let mut removed = 0;
        for id in stale {
            if let Some(session) = sessions.remove(&id) {
                session.exit().await;
                removed += 1;
            }
        }
        info!(removed, remaining = sessions.len(), "Expired idle funnel sessions");
        removed
    }
}

/// Spawn the idle-session sweep (runs every 60s).
pub fn spawn_expiry_task(sessions: Arc<FunnelSessions>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            sessions.expire_idle().await;
        }
    })
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::error::DatabaseError;
    use crate::funnel::analytics::MemoryAnalytics;
    use crate::store::{Database, LeadRecord, LibSqlBackend, WebhookRegistration};
    use crate::submission::WebhookNotifier;

    async fn registry_with(db: Arc<dyn Database>) -> Arc<FunnelSessions> {
        let gateway = Arc::new(SubmissionGateway::new(
            db,
            WebhookNotifier::new(Duration::from_secs(1)),
        ));
        FunnelSessions::new(
            StepGraph::default_funnel().unwrap(),
            gateway,
            Arc::new(MemoryAnalytics::new()),
            Duration::from_secs(600),
        )
    }

    async fn registry() -> (Arc<FunnelSessions>, Arc<dyn Database>) {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        (registry_with(db.clone()).await, db)
    }

    async fn current(session: &FunnelSession) -> &'static str {
        session.view().await.step.unwrap().id
    }

    async fn walk_to_analysing(session: &FunnelSession) {
        session.answer("motivation", &json!("Save money on power bills")).await.unwrap();
        session.answer("roofType", &json!("Tile")).await.unwrap();
        session.answer("householdSize", &json!(3)).await.unwrap();
        session.answer("monthlyBill", &json!(180)).await.unwrap();
        assert_eq!(current(session).await, "analysing");
    }

    async fn walk_to_contact(session: &FunnelSession) {
        walk_to_analysing(session).await;
        session.advance().await.unwrap();
        session.advance().await.unwrap();
        session.answer("island", &json!("North Island")).await.unwrap();
        session.answer("region", &json!("Auckland")).await.unwrap();
        session.answer("gridSellBackInterest", &json!("No")).await.unwrap();
        session.answer("firstName", &json!("Jane")).await.unwrap();
        session.answer("lastName", &json!("")).await.unwrap();
        session.answer("financeInterest", &json!("Why not!")).await.unwrap();
        session.advance().await.unwrap();
        assert_eq!(current(session).await, "contactInfo");
    }

    fn contact() -> Map<String, Value> {
        let mut values = Map::new();
        values.insert("email".into(), json!("jane@example.com"));
        values.insert("phone".into(), json!("021 555 0199"));
        values
    }

    #[tokio::test]
    async fn start_rejects_bad_input() {
        let (sessions, _) = registry().await;
        assert!(matches!(
            sessions.start("  ", "RESIDENTIAL", None).await,
            Err(FunnelError::InvalidStart(_))
        ));
        assert!(matches!(
            sessions.start("1 Test St", "INDUSTRIAL", None).await,
            Err(FunnelError::InvalidStart(_))
        ));
        assert!(sessions.is_empty().await);
    }

    #[tokio::test]
    async fn visitor_id_is_reused() {
        let (sessions, _) = registry().await;
        let visitor = Uuid::new_v4();
        let session = sessions
            .start("1 Test St", "RESIDENTIAL", Some(visitor))
            .await
            .unwrap();
        let view = session.view().await;
        assert_eq!(view.visitor_id, visitor);
        assert_ne!(view.session_id, visitor);
        assert_eq!(view.step.unwrap().id, "motivation");
    }

    #[tokio::test(start_paused = true)]
    async fn interstitials_auto_advance() {
        let (sessions, _) = registry().await;
        let session = sessions.start("1 Test St", "RESIDENTIAL", None).await.unwrap();
        walk_to_analysing(&session).await;

        tokio::time::sleep(Duration::from_millis(2_600)).await;
        assert_eq!(current(&session).await, "savingsSummary");

        tokio::time::sleep(Duration::from_millis(4_100)).await;
        assert_eq!(current(&session).await, "island");

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(current(&session).await, "island");
    }

    #[tokio::test(start_paused = true)]
    async fn manual_navigation_cancels_timer() {
        let (sessions, _) = registry().await;
        let session = sessions.start("1 Test St", "RESIDENTIAL", None).await.unwrap();
        walk_to_analysing(&session).await;

        tokio::time::sleep(Duration::from_millis(1_000)).await;
        session.retreat().await.unwrap();
        assert_eq!(current(&session).await, "monthlyBill");

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(current(&session).await, "monthlyBill");
    }

    #[tokio::test]
    async fn double_submit_creates_one_lead() {
        let (sessions, db) = registry().await;
        let session = sessions.start("1 Test St", "RESIDENTIAL", None).await.unwrap();
        walk_to_contact(&session).await;

        let (first, second) = (contact(), contact());
        let (a, b) = tokio::join!(
            session.submit_contact("contactInfo", &first),
            session.submit_contact("contactInfo", &second),
        );
        let outcomes = [a.unwrap(), b.unwrap()];
        let submitted: Vec<&LeadReceipt> = outcomes
            .iter()
            .filter_map(|o| match o {
                SubmitOutcome::Submitted(r) => Some(r),
                _ => None,
            })
            .collect();
        assert_eq!(submitted.len(), 1);

        let again = session.submit_contact("contactInfo", &contact()).await.unwrap();
        assert_eq!(again, SubmitOutcome::AlreadySubmitted(submitted[0].id));
        assert_eq!(db.list_leads(false).await.unwrap().len(), 1);
        assert_eq!(current(&session).await, "confirmation");
    }

    #[tokio::test]
    async fn resubmitting_contact_after_success_is_acknowledged() {
        let (sessions, db) = registry().await;
        let session = sessions.start("1 Test St", "RESIDENTIAL", None).await.unwrap();
        walk_to_contact(&session).await;
        let body = Value::Object(contact());

        let lead_id = match session.answer("contactInfo", &body).await.unwrap() {
            AnswerOutcome::Submission(SubmitOutcome::Submitted(receipt)) => receipt.id,
            other => panic!("unexpected outcome: {other:?}"),
        };
        assert_eq!(current(&session).await, "confirmation");

        let again = session.answer("contactInfo", &body).await.unwrap();
        assert_eq!(
            again,
            AnswerOutcome::Submission(SubmitOutcome::AlreadySubmitted(lead_id))
        );
        assert_eq!(db.list_leads(false).await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn removing_during_interstitial_cancels_timer() {
        let (sessions, _) = registry().await;
        let session = sessions.start("1 Test St", "RESIDENTIAL", None).await.unwrap();
        walk_to_analysing(&session).await;
        let before = session.view().await;

        sessions.remove(session.id()).await.unwrap();
        let generation = session.controller.lock().await.generation();
        tokio::time::sleep(Duration::from_millis(3_000)).await;

        let after = session.view().await;
        assert_eq!(after.status, FunnelStatus::Exited);
        assert_eq!(after.step.unwrap().id, "analysing");
        assert_eq!(after.answers, before.answers);
        assert_eq!(session.controller.lock().await.generation(), generation);
    }

    #[tokio::test]
    async fn invalid_contact_stays_on_step() {
        let (sessions, db) = registry().await;
        let session = sessions.start("1 Test St", "RESIDENTIAL", None).await.unwrap();
        walk_to_contact(&session).await;

        let err = session
            .answer("contactInfo", &json!({"email": "nope", "phone": "12"}))
            .await
            .unwrap_err();
        match err {
            Error::Funnel(FunnelError::InvalidContact { fields }) => {
                assert_eq!(fields, vec!["email", "phone"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(current(&session).await, "contactInfo");
        assert!(db.list_leads(false).await.unwrap().is_empty());
    }

    /// Store whose lead writes fail until `healthy` is flipped.
    struct FlakyStore {
        inner: LibSqlBackend,
        healthy: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl Database for FlakyStore {
        async fn run_migrations(&self) -> Result<(), DatabaseError> {
            self.inner.run_migrations().await
        }
        async fn insert_lead(&self, fields: &Map<String, Value>) -> Result<LeadRecord, DatabaseError> {
            if !self.healthy.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(DatabaseError::Query("insert_lead: disk full".into()));
            }
            self.inner.insert_lead(fields).await
        }
        async fn get_lead(&self, id: Uuid) -> Result<Option<LeadRecord>, DatabaseError> {
            self.inner.get_lead(id).await
        }
        async fn list_leads(&self, deleted: bool) -> Result<Vec<LeadRecord>, DatabaseError> {
            self.inner.list_leads(deleted).await
        }
        async fn move_lead_to_trash(&self, id: Uuid) -> Result<bool, DatabaseError> {
            self.inner.move_lead_to_trash(id).await
        }
        async fn restore_lead_from_trash(&self, id: Uuid) -> Result<bool, DatabaseError> {
            self.inner.restore_lead_from_trash(id).await
        }
        async fn delete_lead_permanently(&self, id: Uuid) -> Result<bool, DatabaseError> {
            self.inner.delete_lead_permanently(id).await
        }
        async fn empty_trash(&self) -> Result<usize, DatabaseError> {
            self.inner.empty_trash().await
        }
        async fn create_webhook(&self, name: &str, url: &str) -> Result<WebhookRegistration, DatabaseError> {
            self.inner.create_webhook(name, url).await
        }
        async fn list_webhooks(&self) -> Result<Vec<WebhookRegistration>, DatabaseError> {
            self.inner.list_webhooks().await
        }
        async fn list_active_webhooks(&self) -> Result<Vec<WebhookRegistration>, DatabaseError> {
            self.inner.list_active_webhooks().await
        }
        async fn set_webhook_active(&self, id: Uuid, active: bool) -> Result<bool, DatabaseError> {
            self.inner.set_webhook_active(id, active).await
        }
        async fn delete_webhook(&self, id: Uuid) -> Result<bool, DatabaseError> {
            self.inner.delete_webhook(id).await
        }
        async fn get_setting(&self, key: &str) -> Result<Option<Value>, DatabaseError> {
            self.inner.get_setting(key).await
        }
        async fn set_setting(&self, key: &str, value: &Value) -> Result<(), DatabaseError> {
            self.inner.set_setting(key, value).await
        }
    }

    #[tokio::test]
    async fn persistence_failure_allows_retry() {
        let store = Arc::new(FlakyStore {
            inner: LibSqlBackend::new_memory().await.unwrap(),
            healthy: std::sync::atomic::AtomicBool::new(false),
        });
        let sessions = registry_with(store.clone()).await;
        let session = sessions.start("1 Test St", "RESIDENTIAL", None).await.unwrap();
        walk_to_contact(&session).await;

        let err = session.submit_contact("contactInfo", &contact()).await.unwrap_err();
        assert!(matches!(err, Error::Submission(_)));
        let view = session.view().await;
        assert_eq!(view.step.unwrap().id, "contactInfo");
        assert!(view.can_go_back);
        assert!(view.lead_id.is_none());

        store.healthy.store(true, std::sync::atomic::Ordering::SeqCst);
        let outcome = session.submit_contact("contactInfo", &contact()).await.unwrap();
        assert!(matches!(outcome, SubmitOutcome::Submitted(_)));
        assert_eq!(store.list_leads(false).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn remove_exits_session() {
        let (sessions, db) = registry().await;
        let session = sessions.start("1 Test St", "COMMERCIAL", None).await.unwrap();
        let id = session.id();

        let view = sessions.remove(id).await.unwrap();
        assert_eq!(view.status, FunnelStatus::Exited);
        assert!(matches!(sessions.get(id).await, Err(FunnelError::SessionNotFound(_))));
        assert!(matches!(sessions.remove(id).await, Err(FunnelError::SessionNotFound(_))));
        assert!(db.list_leads(false).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn idle_sessions_expire() {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let gateway = Arc::new(SubmissionGateway::new(
            db,
            WebhookNotifier::new(Duration::from_secs(1)),
        ));
        let sessions = FunnelSessions::new(
            StepGraph::default_funnel().unwrap(),
            gateway,
            Arc::new(MemoryAnalytics::new()),
            Duration::from_secs(60),
        );
        let stale = sessions.start("1 Test St", "RESIDENTIAL", None).await.unwrap();
        tokio::time::advance(Duration::from_secs(45)).await;
        let fresh = sessions.start("2 Test St", "RESIDENTIAL", None).await.unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;

        assert_eq!(sessions.expire_idle().await, 1);
        assert!(sessions.get(stale.id()).await.is_err());
        assert!(sessions.get(fresh.id()).await.is_ok());
        assert_eq!(stale.status().await, FunnelStatus::Exited);
    }
}
