//! Error and Result types for Memdex operations.

use std::error::Error as StdError;
use thiserror::Error;

/// A convenience `Result` type for Memdex operations.
pub type Result<T> = std::result::Result<T, MemdexError>;

/// The error type for index and pipeline operations.
///
/// Tree write operations do not produce errors: malformed input (such as an
/// empty key) is a caller precondition violation. Errors only arise during
/// iteration.
#[derive(Debug, Error)]
pub enum MemdexError {
    /// The deadline for iterating has been exceeded. Results observed before
    /// the error are a valid prefix.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// Error surfaced by a row visitor or filter hook, propagated unchanged.
    #[error(transparent)]
    Visitor(#[from] Box<dyn StdError + Send + Sync>),
}

impl MemdexError {
    /// Wraps an ad-hoc message as a visitor error.
    pub fn visitor(msg: impl Into<String>) -> Self {
        MemdexError::Visitor(msg.into().into())
    }

    /// Returns true if this error is the deadline-exceeded signal.
    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self, MemdexError::DeadlineExceeded)
    }
}
