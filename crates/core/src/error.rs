//! Store error model.

use thiserror::Error;

/// Result type returned by every store operation.
pub type StoreResult<T> = Result<T, StoreError>;

/// A rejected store operation.
///
/// The HTTP layer does not distinguish between variants: every one of them is
/// surfaced as a 500 carrying the message, so `Display` is the bare message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The record or query was refused by the store (shape, immutable fields).
    #[error("{0}")]
    Validation(String),

    /// A uniqueness constraint was violated.
    #[error("{0}")]
    Conflict(String),

    /// The backing engine failed.
    #[error("{0}")]
    Backend(String),

    /// The store cannot currently serve requests.
    #[error("{0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }
}
