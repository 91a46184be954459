//! Error types for the grid executor core.
//!

use crate::config::ConfigurationError;
use crate::partition::CookieError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GridError {
    #[error("Task already exists: {task_id}")]
    DuplicateTask { task_id: String },
    #[error("Task not found: {task_id}")]
    TaskNotFound { task_id: String },
    #[error("Task cancelled: {task_id}")]
    TaskCancelled { task_id: String },
    #[error("Task {task_id} failed: {reason}")]
    TaskFailed { task_id: String, reason: String },
    #[error("Cookie decode error: {0}")]
    CookieDecode(#[from] CookieError),
    #[error("Map '{name}' is no longer active")]
    MapInactive { name: String },
    #[error("Communication error: {0}")]
    Communication(String),
    #[error("Executor rejected work: {0}")]
    Rejected(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Unsupported request: {0}")]
    Unsupported(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GridError {
    /// Errors a caller caused by passing an argument that conflicts with cluster state
    pub fn is_illegal_argument(&self) -> bool {
        matches!(self, Self::DuplicateTask { .. } | Self::InvalidInput(_))
    }

    /// Errors raised because the cluster no longer holds what the caller expected
    pub fn is_illegal_state(&self) -> bool {
        matches!(
            self,
            Self::TaskNotFound { .. } | Self::InvalidState(_) | Self::MapInactive { .. }
        )
    }

    /// Whether a higher layer may reasonably retry the operation
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Communication(_) | Self::MapInactive { .. })
    }
}

impl From<serde_json::Error> for GridError {
    fn from(error: serde_json::Error) -> Self {
        GridError::Serialization(format!("JSON serialization error: {error}"))
    }
}

impl From<ConfigurationError> for GridError {
    fn from(error: ConfigurationError) -> Self {
        GridError::ConfigurationError(error.to_string())
    }
}

pub type GridResult<T> = anyhow::Result<T, GridError>;
