//! Domain-specific error types following panic-free policy.

use thiserror::Error;

/// Errors that can occur when building domain values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Names and bodies travel inside a single line, so they cannot span lines
    #[error("{field} cannot contain a line break: {value:?}")]
    LineBreak { field: &'static str, value: String },

    /// Target names are split on the first colon, so they cannot contain one
    #[error("{field} cannot contain the ':' separator: {value:?}")]
    Separator { field: &'static str, value: String },

    /// A target name must address somebody
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
