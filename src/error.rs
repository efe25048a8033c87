//! Error types for the batch notifier.

use std::time::Duration;

/// Top-level error type for a notifier run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Data store error: {0}")]
    Store(#[from] StoreError),

    #[error("Messaging error: {0}")]
    Messaging(#[from] MessagingError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Report error: {0}")]
    Report(#[from] ReportError),
}

/// Configuration-related errors. All of these are fatal and happen
/// before any record is read.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Missing required configuration: {}", .keys.join(", "))]
    MissingRequired { keys: Vec<String> },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration {path}: {source}")]
    ParseError {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Cannot read configuration {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Tabular data store (Grist) errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Case-management messaging (Démarches Simplifiées) errors.
#[derive(Debug, thiserror::Error)]
pub enum MessagingError {
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Cannot connect to messaging API: {0}")]
    Connect(String),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Remote errors: {}", .0.join(", "))]
    Remote(Vec<String>),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Errors that abort processing of a single record. They are caught at
/// the record boundary and never end the run.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Record {record_id} has no value in key field '{field}'")]
    MissingKey { record_id: i64, field: String },
}

/// Errors writing the run artifact.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for the notifier.
pub type Result<T> = std::result::Result<T, Error>;
