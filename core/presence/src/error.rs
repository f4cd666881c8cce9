//! Error types for the presence consumer.

use std::path::PathBuf;

/// Startup configuration problems. Only a missing state-file path is fatal;
/// the placeholder application id is reported as a warning instead.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("STATE_FILE_PATH is not set (use --state-file, the environment or a .env file)")]
    MissingStatePath,

    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },

    #[error("Failed to read env file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failures talking to the presence sink.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Presence sink is not connected")]
    NotConnected,

    #[error("No presence IPC endpoint accepted a connection")]
    NoEndpoint,

    #[error("Presence IPC I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Presence IPC payload error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Presence IPC frame error: {0}")]
    Frame(String),

    #[error("Presence sink rejected the request: {0}")]
    Rejected(String),

    #[error("Presence sink closed the connection: {0}")]
    Closed(String),
}
