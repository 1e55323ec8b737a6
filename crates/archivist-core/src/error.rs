// SPDX-FileCopyrightText: 2026 Archivist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Archivist pipeline.

use thiserror::Error;

/// The primary error type used across all Archivist adapter traits and pipeline stages.
#[derive(Debug, Error)]
pub enum ArchivistError {
    /// Configuration errors (invalid TOML, out-of-range policy values).
    #[error("configuration error: {0}")]
    Config(String),

    /// The chat transcript could not be read or decoded.
    #[error("transcript parse error: {message}")]
    Parse {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A fact write could not be committed after every retry was spent.
    ///
    /// Fatal: the checkpoint cannot advance past a message whose facts were not written.
    #[error("storage write failed after {attempts} attempts: {source}")]
    StorageWrite {
        attempts: u32,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Retryable extraction failure (connection refused, timeout, 5xx).
    #[error("transient extraction failure: {message}")]
    TransientExtraction {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Non-retryable extraction failure (malformed response, invalid candidate).
    #[error("permanent extraction failure: {message}")]
    PermanentExtraction { message: String },

    /// Persisted processing state failed validation.
    #[error(
        "corrupted processing state: {message} (run `archivist reset-state` to start over)"
    )]
    CorruptedState { message: String },

    /// Adapter health check failed.
    #[error("health check failed for {name}: {source}")]
    HealthCheckFailed {
        name: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ArchivistError {
    /// Returns true when retrying the same operation may succeed.
    ///
    /// Storage errors are included: the orchestrator retries them before
    /// escalating to [`ArchivistError::StorageWrite`].
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ArchivistError::TransientExtraction { .. }
                | ArchivistError::Timeout { .. }
                | ArchivistError::Storage { .. }
        )
    }

    /// Shorthand for a corrupted-state error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        ArchivistError::CorruptedState {
            message: message.into(),
        }
    }

    /// Shorthand for a storage error carrying only a message.
    pub fn storage(message: impl Into<String>) -> Self {
        let message: String = message.into();
        ArchivistError::Storage {
            source: message.into(),
        }
    }
}
