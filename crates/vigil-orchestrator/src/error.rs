//! Error types for the orchestrator.

use thiserror::Error;
use vigil_broker::BrokerError;
use vigil_store::StorageError;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("Failed to presign artifact '{key}': {message}")]
    Presign { key: String, message: String },

    #[error("Message encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid schedule '{expression}': {message}")]
    Schedule { expression: String, message: String },

    #[error("Invalid thresholds: {0}")]
    Thresholds(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid settings: {0}")]
    Settings(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
