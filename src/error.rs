//! Error types for the quote service.

use std::time::Duration;

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Funnel error: {0}")]
    Funnel(#[from] FunnelError),

    #[error("Submission error: {0}")]
    Submission(#[from] SubmissionError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Funnel navigation and validation errors.
#[derive(Debug, thiserror::Error)]
pub enum FunnelError {
    #[error("Invalid funnel start: {0}")]
    InvalidStart(String),

    #[error("Invalid step graph: {0}")]
    InvalidGraph(String),

    #[error("Unknown step: {0}")]
    UnknownStep(String),

    #[error("Step {step_id} is not the current step (current: {current})")]
    NotCurrentStep { step_id: String, current: String },

    #[error("Step {step_id} does not accept input of kind {kind}")]
    WrongKind { step_id: String, kind: String },

    #[error("'{value}' is not an option of step {step_id}")]
    InvalidOption { step_id: String, value: String },

    #[error("Step {step_id} requires a value")]
    MissingValue { step_id: String },

    #[error("Invalid contact details: {}", fields.join(", "))]
    InvalidContact { fields: Vec<String> },

    #[error("Funnel session {0} not found")]
    SessionNotFound(String),

    #[error("Funnel session is {status}, no further input accepted")]
    Finished { status: String },
}

/// Errors returned by the submission gateway.
#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error("Failed to persist lead: {0}")]
    Persistence(#[from] DatabaseError),
}

/// Outbound webhook delivery errors. Logged, never surfaced to funnel users.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Webhook {name} request failed: {reason}")]
    RequestFailed { name: String, reason: String },

    #[error("Webhook {name} responded with HTTP {status}")]
    BadStatus { name: String, status: u16 },

    #[error("Webhook {name} timed out after {timeout:?}")]
    Timeout { name: String, timeout: Duration },

    #[error("Invalid webhook registration: {0}")]
    InvalidRegistration(String),
}
