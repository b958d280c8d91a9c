//! Error types for record validation.

use thiserror::Error;

use crate::{ActionType, Status};

/// Errors raised while building or mutating records.
#[derive(Debug, Error, Clone)]
pub enum ModelError {
    /// An enum-valued field holds a value outside its closed set.
    #[error("invalid {field}: '{value}' (expected one of: {expected})")]
    InvalidEnum {
        field: &'static str,
        value: String,
        expected: &'static str,
    },

    /// A field required by the record shape is absent.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// A triple is populated that the action type does not carry.
    #[error("{action_type} action cannot carry {triple}_* fields")]
    UnexpectedTriple {
        triple: &'static str,
        action_type: ActionType,
    },

    /// Field-level validation failed.
    #[error("validation failed: {0}")]
    Invalid(#[from] validator::ValidationErrors),

    /// Status transition rejected.
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// A status change that would leave a terminal status.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("status is already {from}; refusing to change it to {to} without force")]
pub struct TransitionError {
    pub from: Status,
    pub to: Status,
}
