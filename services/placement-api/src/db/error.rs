//! Storage error types.

use placement_model::ModelError;
use thiserror::Error;

use super::Resource;

/// Storage operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Failed to connect to the database.
    #[error("failed to connect to database: {0}")]
    Connect(#[source] sqlx::Error),

    /// Failed to execute a query.
    #[error("query failed: {0}")]
    Query(#[source] sqlx::Error),

    /// Failed to run migrations.
    #[error("migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),

    /// Migration directory not found in the current environment.
    #[error("migration directory not found; tried {tried}. Last error: {last_error}. Run from repo root or services/placement-api.")]
    MigrationDirNotFound { tried: String, last_error: String },

    /// No live row with this id.
    #[error("{resource} not found: {id}")]
    NotFound { resource: Resource, id: String },

    /// A row with this id already exists.
    #[error("{resource} already exists: {id}")]
    Duplicate { resource: Resource, id: String },

    /// The stored row refused the change (illegal transition, bad end time).
    #[error(transparent)]
    Rejected(#[from] ModelError),

    /// A stored value that no longer parses.
    #[error("column {column} holds unrecognised value {value:?}")]
    InvalidColumn { column: &'static str, value: String },
}

impl DbError {
    /// Returns true when the store could not be reached at all.
    pub fn is_unavailable(&self) -> bool {
        match self {
            Self::Connect(_) => true,
            Self::Query(e) => matches!(
                e,
                sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::Io(_)
                    | sqlx::Error::Tls(_)
            ),
            _ => false,
        }
    }

    /// Map an insert failure, turning a unique violation into `Duplicate`.
    pub(crate) fn on_insert(e: sqlx::Error, resource: Resource, id: impl ToString) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => Self::Duplicate {
                resource,
                id: id.to_string(),
            },
            _ => Self::Query(e),
        }
    }
}
