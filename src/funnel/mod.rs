//! Quote funnel: step graph, controller, sessions and HTTP surface.

pub mod analytics;
pub mod controller;
pub mod graph;
pub mod record;
pub mod routes;
pub mod session;
pub mod step;

pub use analytics::{AnalyticsSink, FunnelEvent, MemoryAnalytics, TracingAnalytics};
pub use controller::{FunnelController, FunnelStatus, Navigation};
pub use graph::StepGraph;
pub use record::{AnswerRecord, PropertyType};
pub use session::{FunnelSession, FunnelSessions, FunnelView, SubmitOutcome};
pub use step::{StepDefinition, StepKind};
