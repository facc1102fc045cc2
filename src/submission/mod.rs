//! Lead submission: persistence plus webhook notification.

pub mod gateway;
pub mod webhooks;

pub use gateway::{LeadReceipt, SubmissionGateway};
pub use webhooks::{FanOutSummary, WebhookNotifier};
