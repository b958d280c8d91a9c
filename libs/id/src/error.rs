//! Error types for ID parsing and validation.

use thiserror::Error;

/// Errors that can occur when parsing or validating IDs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The ID string is empty.
    #[error("ID cannot be empty")]
    Empty,

    /// The string is not a UUID.
    #[error("invalid {kind}: {message}")]
    InvalidUuid { kind: &'static str, message: String },

    /// The nil UUID is reserved and never identifies a record.
    #[error("{kind} cannot be the nil UUID")]
    Nil { kind: &'static str },
}
