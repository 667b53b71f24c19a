//! Common error types for songlib

use thiserror::Error;

/// Common result type for songlib operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the songlib crates
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Message broker error (wraps lapin::Error)
    #[error("Queue error: {0}")]
    Queue(#[from] lapin::Error),

    /// Cache store error (wraps redis::RedisError)
    #[error("Cache store error: {0}")]
    Cache(#[from] redis::RedisError),

    /// Payload or response decoding error
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
