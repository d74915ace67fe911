//! Task store error types.

use std::path::PathBuf;
use thiserror::Error;
use vprod_models::{TaskId, TransitionError};

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt task file {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    #[error("Task already exists: {0}")]
    AlreadyExists(TaskId),

    #[error("Store operation did not finish: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl StoreError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// The backing storage could not be read or written.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::Io { .. } | Self::Serialization(_) | Self::Corrupt { .. } | Self::Join(_)
        )
    }
}
