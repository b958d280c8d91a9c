//! Service error taxonomy.

use placement_model::ModelError;
use thiserror::Error;

use crate::db::{DbError, Resource};

/// One rejected input field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

/// Why a write conflicted with stored state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictReason {
    /// Leaving a terminal status without `force`.
    InvalidTransition,
    /// The id is already taken.
    AlreadyExists,
}

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Input rejected before any write.
    #[error("validation failed: {message}")]
    Validation {
        message: String,
        violations: Vec<FieldViolation>,
    },

    #[error("{resource} not found: {id}")]
    NotFound { resource: Resource, id: String },

    #[error("{resource} conflict: {message}")]
    Conflict {
        resource: Resource,
        reason: ConflictReason,
        message: String,
    },

    /// The store failed; never swallowed.
    #[error("storage error: {0}")]
    Storage(#[source] DbError),
}

impl ServiceError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            violations: Vec::new(),
        }
    }

    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        let field = field.into();
        let message = message.into();
        Self::Validation {
            message: format!("{field}: {message}"),
            violations: vec![FieldViolation { field, message }],
        }
    }

    pub(crate) fn not_found(resource: Resource, id: impl ToString) -> Self {
        Self::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    /// Map a model error raised while handling `resource`.
    pub(crate) fn from_model(resource: Resource, e: ModelError) -> Self {
        match e {
            ModelError::Transition(t) => Self::Conflict {
                resource,
                reason: ConflictReason::InvalidTransition,
                message: t.to_string(),
            },
            ModelError::Invalid(errors) => {
                let violations = errors
                    .field_errors()
                    .into_iter()
                    .flat_map(|(field, errs)| {
                        errs.iter().map(move |err| FieldViolation {
                            field: field.to_string(),
                            message: err
                                .message
                                .as_ref()
                                .map(|m| m.to_string())
                                .unwrap_or_else(|| err.code.to_string()),
                        })
                    })
                    .collect();
                Self::Validation {
                    message: errors.to_string(),
                    violations,
                }
            }
            ModelError::MissingField(field) => Self::invalid_field(field, "is required"),
            other => Self::validation(other.to_string()),
        }
    }

    /// Map a storage error raised while handling `resource`.
    pub(crate) fn from_db(resource: Resource, e: DbError) -> Self {
        match e {
            DbError::NotFound { resource, id } => Self::NotFound { resource, id },
            DbError::Duplicate { resource, id } => Self::Conflict {
                resource,
                reason: ConflictReason::AlreadyExists,
                message: format!("{resource} {id} already exists"),
            },
            DbError::Rejected(model) => Self::from_model(resource, model),
            other => Self::Storage(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use placement_model::{Status, TransitionError};

    #[test]
    fn test_transition_is_conflict() {
        let e = ServiceError::from_db(
            Resource::Decision,
            DbError::Rejected(ModelError::Transition(TransitionError {
                from: Status::Succeeded,
                to: Status::Failed,
            })),
        );
        assert!(matches!(
            e,
            ServiceError::Conflict {
                reason: ConflictReason::InvalidTransition,
                ..
            }
        ));
    }

    #[test]
    fn test_duplicate_is_conflict() {
        let e = ServiceError::from_db(
            Resource::Action,
            DbError::Duplicate {
                resource: Resource::Action,
                id: "x".into(),
            },
        );
        assert!(matches!(
            e,
            ServiceError::Conflict {
                resource: Resource::Action,
                reason: ConflictReason::AlreadyExists,
                ..
            }
        ));
    }

    #[test]
    fn test_missing_field_names_field() {
        let e = ServiceError::from_model(
            Resource::Action,
            ModelError::MissingField("bound_pod_name"),
        );
        match e {
            ServiceError::Validation { violations, .. } => {
                assert_eq!(violations[0].field, "bound_pod_name");
            }
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn test_storage_passes_through() {
        let e = ServiceError::from_db(
            Resource::Decision,
            DbError::InvalidColumn {
                column: "decision_status",
                value: "done".into(),
            },
        );
        assert!(matches!(e, ServiceError::Storage(_)));
    }
}
