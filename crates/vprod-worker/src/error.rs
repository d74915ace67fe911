//! Worker error types.

use std::fmt;

use serde::Serialize;
use thiserror::Error;
use vprod_media::MediaError;
use vprod_store::StoreError;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Text completion failed: {0}")]
    Collaborator(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WorkerError {
    pub fn malformed_input(msg: impl Into<String>) -> Self {
        Self::MalformedInput(msg.into())
    }

    pub fn collaborator(msg: impl Into<String>) -> Self {
        Self::Collaborator(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Classify this error for the failed task's error string and metrics.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::MalformedInput(_) => FailureKind::MalformedInput,
            Self::Collaborator(_) => FailureKind::CollaboratorFailure,
            Self::Media(e) if e.is_precondition() => FailureKind::PreconditionFailed,
            Self::Media(MediaError::Io(_) | MediaError::JsonParse(_)) => FailureKind::Internal,
            Self::Media(_) => FailureKind::EncodingFailure,
            Self::Store(e) if e.is_unavailable() => FailureKind::StoreUnavailable,
            Self::Store(_) | Self::Config(_) | Self::Io(_) | Self::Serialization(_) => {
                FailureKind::Internal
            }
        }
    }
}

/// Coarse failure classes recorded on failed tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    PreconditionFailed,
    MalformedInput,
    CollaboratorFailure,
    EncodingFailure,
    StoreUnavailable,
    /// The worker running the task went away before publishing an outcome
    Interrupted,
    Internal,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::PreconditionFailed => "precondition_failed",
            FailureKind::MalformedInput => "malformed_input",
            FailureKind::CollaboratorFailure => "collaborator_failure",
            FailureKind::EncodingFailure => "encoding_failure",
            FailureKind::StoreUnavailable => "store_unavailable",
            FailureKind::Interrupted => "interrupted",
            FailureKind::Internal => "internal",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
