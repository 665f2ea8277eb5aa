//! Error types for the storage layer.

use thiserror::Error;

use crate::models::TrainStatus;

/// Errors that can occur in the storage layer.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Database driver error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Item not found in storage.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Item already exists in storage.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Requested status change is not an edge of the training state machine.
    #[error("Invalid status transition for {user_id}/{model_type}: {from} -> {to}")]
    InvalidTransition {
        /// Owner of the model.
        user_id: String,
        /// Model type identifier.
        model_type: String,
        /// Status the change starts from.
        from: TrainStatus,
        /// Status the change was asked to reach.
        to: TrainStatus,
    },

    /// Invalid data error.
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Result type alias for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
