//! Error types for message bus

use thiserror::Error;

/// Message bus error
#[derive(Debug, Error)]
pub enum Error {
    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Publish error
    #[error("Publish error: {0}")]
    Publish(String),

    /// Subscribe error
    #[error("Subscribe error: {0}")]
    Subscribe(String),

    /// Stream or consumer setup error
    #[error("Stream setup error: {0}")]
    StreamSetup(String),

    /// Binding pattern cannot be expressed by the broker
    #[error("Invalid binding: {0}")]
    InvalidBinding(String),

    /// Dead-letter store is at capacity
    #[error("Dead-letter store full (capacity {0})")]
    DeadLetterFull(usize),

    /// Dead letter not found
    #[error("Dead letter not found: {0}")]
    DeadLetterNotFound(String),
}

/// Result type
pub type Result<T> = std::result::Result<T, Error>;
