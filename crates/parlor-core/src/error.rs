//! Domain-specific error types following panic-free policy.

use thiserror::Error;

/// Errors that can occur in domain operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Username was empty or only whitespace
    #[error("Username must not be blank")]
    BlankUsername,

    /// Username contains a line break and could not be sent back on one line
    #[error("Username must fit on a single line: {0:?}")]
    MultilineUsername(String),
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
