//! Error types for the broker layer.

use thiserror::Error;

/// Result type alias for broker operations.
pub type BrokerResult<T> = std::result::Result<T, BrokerError>;

/// Errors that can occur while talking to the message broker.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Protocol or channel error reported by the AMQP client.
    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),

    /// Every connection attempt failed.
    #[error("failed to connect to broker after {attempts} attempts: {source}")]
    Connect {
        /// Attempts made before giving up.
        attempts: u32,
        /// Error of the last attempt.
        #[source]
        source: lapin::Error,
    },

    /// The broker refused the call.
    #[error("broker unavailable: {0}")]
    Unavailable(String),

    /// The connection was closed.
    #[error("broker connection closed")]
    Closed,
}
