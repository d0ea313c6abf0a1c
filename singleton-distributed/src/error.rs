//! Error types for slots and locks.

use thiserror::Error;

/// Result type for slot operations.
pub type SlotResult<T> = Result<T, SlotError>;

/// Result type for lock operations.
pub type LockResult<T> = Result<T, LockError>;

/// Slot store errors.
///
/// A missing slot or a read that timed out is not an error; see
/// [`SlotLookup`](crate::slot::SlotLookup).
#[derive(Debug, Error)]
pub enum SlotError {
    /// Backend failure
    #[error("Slot store error: {0}")]
    Store(String),

    /// Value could not be encoded or decoded
    #[error("Slot serialization error: {0}")]
    Serialization(String),

    /// Redis error
    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

impl SlotError {
    /// Create a new store error
    pub fn store<S: Into<String>>(msg: S) -> Self {
        Self::Store(msg.into())
    }
}

impl From<serde_json::Error> for SlotError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Distributed lock errors
#[derive(Debug, Error)]
pub enum LockError {
    #[error("Lock timeout")]
    Timeout,

    #[error("Lock not held")]
    NotHeld,

    #[error("Lease store error: {0}")]
    Store(String),

    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

impl LockError {
    /// Create a new store error
    pub fn store<S: Into<String>>(msg: S) -> Self {
        Self::Store(msg.into())
    }
}
