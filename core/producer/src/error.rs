//! Error types for the producer.
//!
//! Nothing here is ever surfaced to the host: callers log and carry on.

use flrp_state_protocol::DocumentError;
use std::path::PathBuf;

/// A single storage operation failed.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error("JSON error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("write verification failed at {path}: wrote {expected}, read back {found}")]
    VerificationMismatch {
        path: PathBuf,
        expected: i64,
        found: i64,
    },

    #[error("probe payload did not round-trip at {0}")]
    ProbeMismatch(PathBuf),
}

impl StorageError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        StorageError::Io {
            context: context.into(),
            source,
        }
    }
}

/// The durable write protocol gave up after its bounded attempts.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("all {attempts} write attempts failed for {path}: {last}")]
    Exhausted {
        attempts: u32,
        path: PathBuf,
        #[source]
        last: StorageError,
    },
}
