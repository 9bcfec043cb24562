//! Error types for Site Digest.

use std::time::Duration;

use crate::task::validate::FieldError;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Task error: {0}")]
    Task(#[from] TaskError),
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
}

/// Delivery channel errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Failed to send response on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Invalid destination for channel {name}: {destination}")]
    InvalidDestination { name: String, destination: String },
}

/// Content fetcher errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("Site not reachable: {0}")]
    NotReachable(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP status {status}")]
    Http { status: u16 },
}

impl FetchError {
    /// Whether another attempt could succeed. Malformed input never does.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            FetchError::InvalidUrl(_) | FetchError::InvalidSelector { .. }
        )
    }
}

/// Summarizer errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} is not reachable: {reason}")]
    Unreachable { provider: String, reason: String },

    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Invalid prompt: {0}")]
    InvalidPrompt(String),
}

impl LlmError {
    /// Connection-level failures are worth retrying; malformed output is not.
    pub fn is_transient(&self) -> bool {
        matches!(self, LlmError::Unreachable { .. })
    }
}

/// Task definition errors, surfaced to whoever submitted the task.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Task with ID {0} not found")]
    NotFound(i64),

    #[error("Invalid task: {}", format_field_errors(.0))]
    Invalid(Vec<FieldError>),
}

fn format_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
