//! Persistence layer: libSQL-backed storage for leads, webhooks, and settings.

pub mod libsql_backend;
pub mod migrations;
pub mod model;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use model::{LeadRecord, SettingKey, WebhookRegistration};
pub use traits::Database;
