//! Error types for alert-ingest.

use std::time::Duration;

/// Top-level error type for an ingest run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Transaction store errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Request to {endpoint} failed: {reason}")]
    Request { endpoint: String, reason: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Credentials unavailable: {0}")]
    Credentials(#[from] AuthError),
}

/// Inbox (message selector) errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Inbox {name} unreachable: {reason}")]
    Unreachable { name: String, reason: String },

    #[error("Authentication failed for inbox {name}: {reason}")]
    AuthFailed { name: String, reason: String },

    #[error("Inbox {name} protocol error: {reason}")]
    Protocol { name: String, reason: String },

    #[error("Inbox task failed: {0}")]
    Task(String),
}

/// Text-generation provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },
}

/// Credential/token errors.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Token request to {endpoint} failed: {reason}")]
    RequestFailed { endpoint: String, reason: String },

    #[error("Token endpoint {endpoint} rejected credentials (status {status})")]
    Rejected { endpoint: String, status: u16 },

    #[error("Malformed token response: {0}")]
    InvalidResponse(String),
}

/// Pipeline-related errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Message selection failed: {0}")]
    Selection(#[from] ChannelError),

    #[error("Schedule error: {0}")]
    Schedule(String),
}

/// Result type alias for alert-ingest.
pub type Result<T> = std::result::Result<T, Error>;
