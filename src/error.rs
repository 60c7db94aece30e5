//! # Worker Error Types
//!
//! Structured error taxonomy for request processing. Every variant escapes to the
//! worker loop, which turns it into a published error response using
//! [`WorkerError::error_code`] and [`WorkerError::user_message`].

use crate::config::ConfigurationError;
use std::fmt;
use thiserror::Error;

/// Which side of a comparison a cell set reference belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonSide {
    /// `cellSet`
    First,
    /// `compareWith`
    Second,
}

impl ComparisonSide {
    pub fn other(self) -> Self {
        match self {
            ComparisonSide::First => ComparisonSide::Second,
            ComparisonSide::Second => ComparisonSide::First,
        }
    }
}

impl fmt::Display for ComparisonSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComparisonSide::First => write!(f, "1st"),
            ComparisonSide::Second => write!(f, "2nd"),
        }
    }
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Invalid parameters: {0}")]
    Parameter(String),

    #[error("No cell id fulfills the {side} cell set ({key})")]
    CellSetNotFound { side: ComparisonSide, key: String },

    #[error("Basis cell set not found: {key}")]
    InvalidBasis { key: String },

    #[error("Transport error calling {endpoint} after {attempts} attempt(s): {message}")]
    Transport {
        endpoint: String,
        attempts: u32,
        message: String,
    },

    #[error("R worker error {error_code}: {user_message}")]
    RWorker {
        error_code: String,
        user_message: String,
    },

    #[error("Unsupported task: {name}")]
    UnsupportedTask { name: String },

    #[error("Request expired at {timeout}")]
    RequestExpired { timeout: String },

    #[error("Cell set store error for experiment {experiment_id}: {message}")]
    CellSetStore {
        experiment_id: String,
        message: String,
    },

    #[error("Queue error: {operation}: {message}")]
    Queue { operation: String, message: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Dataset load error for experiment {experiment_id}: {message}")]
    DatasetLoad {
        experiment_id: String,
        message: String,
    },

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

impl WorkerError {
    pub fn parameter(message: impl Into<String>) -> Self {
        Self::Parameter(message.into())
    }

    pub fn missing_field(task: &str, field: &str) -> Self {
        Self::Parameter(format!("{task} requires the '{field}' field in the request body"))
    }

    pub fn cell_set_not_found(side: ComparisonSide, key: impl Into<String>) -> Self {
        Self::CellSetNotFound {
            side,
            key: key.into(),
        }
    }

    pub fn invalid_basis(key: impl Into<String>) -> Self {
        Self::InvalidBasis { key: key.into() }
    }

    pub fn transport(endpoint: impl Into<String>, attempts: u32, message: impl Into<String>) -> Self {
        Self::Transport {
            endpoint: endpoint.into(),
            attempts,
            message: message.into(),
        }
    }

    pub fn r_worker(error_code: impl Into<String>, user_message: impl Into<String>) -> Self {
        Self::RWorker {
            error_code: error_code.into(),
            user_message: user_message.into(),
        }
    }

    pub fn unsupported_task(name: impl Into<String>) -> Self {
        Self::UnsupportedTask { name: name.into() }
    }

    pub fn cell_set_store(experiment_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CellSetStore {
            experiment_id: experiment_id.into(),
            message: message.into(),
        }
    }

    pub fn queue(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Queue {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn dataset_load(experiment_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DatasetLoad {
            experiment_id: experiment_id.into(),
            message: message.into(),
        }
    }

    /// Machine-readable code published alongside failed responses
    pub fn error_code(&self) -> &str {
        match self {
            WorkerError::Parameter(_) => "INVALID_PARAMETERS",
            WorkerError::CellSetNotFound { .. } => "CELL_SET_NOT_FOUND",
            WorkerError::InvalidBasis { .. } => "INVALID_BASIS",
            WorkerError::Transport { .. } => "TRANSPORT_ERROR",
            WorkerError::RWorker { error_code, .. } => error_code,
            WorkerError::UnsupportedTask { .. } => "UNSUPPORTED_TASK",
            WorkerError::RequestExpired { .. } => "REQUEST_EXPIRED",
            WorkerError::CellSetStore { .. } => "CELL_SET_STORE_ERROR",
            WorkerError::Queue { .. } => "QUEUE_ERROR",
            WorkerError::Serialization(_) => "SERIALIZATION_ERROR",
            WorkerError::DatasetLoad { .. } => "DATASET_LOAD_ERROR",
            WorkerError::Configuration(_) => "CONFIGURATION_ERROR",
        }
    }

    /// Human-readable message; the backend's own message for [`WorkerError::RWorker`]
    pub fn user_message(&self) -> String {
        match self {
            WorkerError::RWorker { user_message, .. } => user_message.clone(),
            other => other.to_string(),
        }
    }

    /// Whether the error is a transient transport fault worth retrying
    pub fn is_transient(&self) -> bool {
        matches!(self, WorkerError::Transport { .. })
    }
}

impl From<serde_json::Error> for WorkerError {
    fn from(error: serde_json::Error) -> Self {
        WorkerError::Serialization(format!("JSON serialization error: {error}"))
    }
}

pub type Result<T> = std::result::Result<T, WorkerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_set_not_found_names_the_side() {
        let err = WorkerError::cell_set_not_found(ComparisonSide::Second, "rest");
        assert_eq!(err.to_string(), "No cell id fulfills the 2nd cell set (rest)");
        assert_eq!(err.error_code(), "CELL_SET_NOT_FOUND");
    }

    #[test]
    fn test_r_worker_error_exposes_backend_code_and_message() {
        let err = WorkerError::r_worker("R_WORKER_ERROR", "User message");
        assert_eq!(err.error_code(), "R_WORKER_ERROR");
        assert_eq!(err.user_message(), "User message");
        assert!(!err.is_transient());
    }

    #[test]
    fn test_only_transport_errors_are_transient() {
        assert!(WorkerError::transport("getClusters", 3, "connection refused").is_transient());
        assert!(!WorkerError::parameter("missing body").is_transient());
        assert!(!WorkerError::unsupported_task("Nope").is_transient());
    }
}
