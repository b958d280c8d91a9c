//! Storage layer for the placement service.
//!
//! This module provides:
//! - Connection pool management and migrations
//! - The [`DecisionStore`] and [`ActionStore`] traits the service runs on
//! - A Postgres implementation ([`PgStore`]) and an in-process one
//!   ([`MemoryStore`]) for development and tests
//!
//! Every mutation is a single-row atomic read-check-write.

mod error;
mod memory;
mod postgres;

pub use error::DbError;
pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use placement_correlation::MatchKey;
use placement_id::{ActionId, DecisionId, PodParentId};
use placement_model::{
    Action, ActionType, ActionUpdate, Decision, PodParentKind, Status, Transition, TripleColumns,
};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::info;

/// Database configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Database connection URL.
    pub database_url: String,

    /// Maximum number of connections in the pool.
    pub max_connections: u32,

    /// Minimum number of idle connections.
    pub min_connections: u32,

    /// Connection acquire timeout.
    pub acquire_timeout: Duration,

    /// Idle connection timeout.
    pub idle_timeout: Duration,

    /// Maximum lifetime of a connection.
    pub max_lifetime: Duration,
}

const DEFAULT_DATABASE_URL: &str = "postgres://localhost/placement";

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: 10,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(1800),
        }
    }
}

impl DbConfig {
    /// Read `DATABASE_URL`, `DB_MAX_CONNECTIONS` and `DB_MIN_CONNECTIONS`
    /// through `get`, falling back to the defaults.
    pub(crate) fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let database_url = get("DATABASE_URL").unwrap_or(defaults.database_url.clone());

        let max_connections = get("DB_MAX_CONNECTIONS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.max_connections);

        let min_connections = get("DB_MIN_CONNECTIONS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.min_connections);

        Self {
            database_url,
            max_connections,
            min_connections,
            ..defaults
        }
    }
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    pub async fn connect(config: &DbConfig) -> Result<Self, DbError> {
        info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            "Connecting to database"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .max_lifetime(Some(config.max_lifetime))
            .connect(&config.database_url)
            .await
            .map_err(DbError::Connect)?;

        info!("Database connection pool established");

        Ok(Self { pool })
    }

    /// Run pending migrations.
    ///
    /// Loads the SQL files at runtime from the first directory that exists.
    pub async fn run_migrations(&self) -> Result<(), DbError> {
        info!("Running database migrations");

        let candidates = vec![
            std::path::PathBuf::from("./migrations"),
            std::path::PathBuf::from("services/placement-api/migrations"),
            std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("migrations"),
        ];
        let mut last_error: Option<sqlx::migrate::MigrateError> = None;

        for dir in &candidates {
            match sqlx::migrate::Migrator::new(dir.clone()).await {
                Ok(migrator) => {
                    info!(migrations_dir = %dir.display(), "Loaded migrations");
                    migrator.run(&self.pool).await.map_err(DbError::Migration)?;
                    info!("Database migrations complete");
                    return Ok(());
                }
                Err(e) => {
                    last_error = Some(e);
                }
            }
        }

        let tried = candidates
            .iter()
            .map(|dir| dir.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");

        Err(DbError::MigrationDirNotFound {
            tried,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown error".to_string()),
        })
    }

    /// Get a store handle over this pool.
    pub fn store(&self) -> PgStore {
        PgStore::new(self.pool.clone())
    }
}

// =============================================================================
// Queries
// =============================================================================

/// Kind of record a storage error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Decision,
    Action,
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Decision => "decision",
            Self::Action => "action",
        })
    }
}

/// Offset pagination. Construct through the service, which checks bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub skip: i64,
    pub limit: i64,
}

impl Page {
    pub const DEFAULT_LIMIT: i64 = 100;
    pub const MAX_LIMIT: i64 = 1000;

    fn window<T>(&self, items: impl Iterator<Item = T>) -> Vec<T> {
        items
            .skip(usize::try_from(self.skip).unwrap_or(usize::MAX))
            .take(usize::try_from(self.limit).unwrap_or(0))
            .collect()
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: Self::DEFAULT_LIMIT,
        }
    }
}

/// Decision list filters. Absent fields impose no constraint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecisionFilter {
    pub id: Option<DecisionId>,
    pub node_name: Option<String>,
    pub decision_status: Option<Status>,
    pub queue_name: Option<String>,
    pub pod_parent_kind: Option<PodParentKind>,
    pub namespace: Option<String>,
    pub pod_name: Option<String>,
    pub action_type: Option<ActionType>,
    pub pod_parent_id: Option<PodParentId>,
    pub include_deleted: bool,
}

fn eq_opt<T: PartialEq + ?Sized>(want: Option<&T>, have: &T) -> bool {
    want.is_none_or(|w| w == have)
}

impl DecisionFilter {
    pub fn matches(&self, d: &Decision) -> bool {
        (self.include_deleted || !d.is_deleted())
            && eq_opt(self.id.as_ref(), &d.id)
            && eq_opt(self.node_name.as_deref(), d.node_name.as_str())
            && eq_opt(self.decision_status.as_ref(), &d.decision_status)
            && eq_opt(self.queue_name.as_deref(), d.queue_name.as_str())
            && eq_opt(self.pod_parent_kind.as_ref(), &d.pod_parent_kind)
            && eq_opt(self.namespace.as_deref(), d.namespace.as_str())
            && eq_opt(self.pod_name.as_deref(), d.pod_name.as_str())
            && eq_opt(self.action_type.as_ref(), &d.action_type)
            && eq_opt(self.pod_parent_id.as_ref(), &d.pod_parent_id)
    }
}

/// Action list filters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionFilter {
    pub action_type: Option<ActionType>,
    pub action_status: Option<Status>,
    pub pod_parent_uid: Option<PodParentId>,
    pub pod_parent_name: Option<String>,
    pub pod_parent_type: Option<PodParentKind>,
    /// Matches the created, deleted or bound node.
    pub node_name: Option<String>,
    /// Exact match on each populated triple column.
    pub columns: TripleColumns,
}

impl ActionFilter {
    pub fn matches(&self, a: &Action) -> bool {
        let have = a.target.to_columns();
        eq_opt(self.action_type.as_ref(), &a.action_type())
            && eq_opt(self.action_status.as_ref(), &a.action_status)
            && eq_opt(self.pod_parent_uid.as_ref(), &a.pod_parent_uid)
            && eq_opt(self.pod_parent_name.as_deref(), a.pod_parent_name.as_str())
            && eq_opt(self.pod_parent_type.as_ref(), &a.pod_parent_type)
            && self
                .node_name
                .as_deref()
                .is_none_or(|node| a.target.touches_node(node))
            && self
                .columns
                .entries()
                .iter()
                .zip(have.entries())
                .all(|((_, want), (_, got))| want.is_none_or(|w| Some(w) == got))
    }
}

// =============================================================================
// Store traits
// =============================================================================

/// Persistence for scheduling decisions.
#[async_trait]
pub trait DecisionStore: Send + Sync {
    /// Insert a new decision. Fails with `Duplicate` if the id exists.
    async fn insert_decision(&self, decision: &Decision) -> Result<(), DbError>;

    /// Fetch a live (not soft-deleted) decision.
    async fn get_decision(&self, id: DecisionId) -> Result<Option<Decision>, DbError>;

    /// Ordered by `created_at` descending, then id ascending.
    async fn list_decisions(
        &self,
        filter: &DecisionFilter,
        page: Page,
    ) -> Result<Vec<Decision>, DbError>;

    /// Apply a status transition under a row lock.
    async fn update_decision_status(
        &self,
        id: DecisionId,
        to: Status,
        force: bool,
    ) -> Result<(Decision, Transition), DbError>;

    /// Stamp `deleted_at`. Fails with `NotFound` if the decision is absent
    /// or already deleted.
    async fn soft_delete_decision(
        &self,
        id: DecisionId,
        at: DateTime<Utc>,
    ) -> Result<Decision, DbError>;
}

/// Persistence for executor actions.
#[async_trait]
pub trait ActionStore: Send + Sync {
    /// Insert a new action. Fails with `Duplicate` if the id exists.
    async fn insert_action(&self, action: &Action) -> Result<(), DbError>;

    async fn get_action(&self, id: ActionId) -> Result<Option<Action>, DbError>;

    /// Ordered by `action_start_time` descending, then id ascending.
    async fn list_actions(&self, filter: &ActionFilter, page: Page)
        -> Result<Vec<Action>, DbError>;

    /// Every action sharing one of `keys`, in no particular order.
    async fn actions_for_keys(&self, keys: &[MatchKey]) -> Result<Vec<Action>, DbError>;

    /// Apply an executor update under a row lock.
    async fn update_action(
        &self,
        id: ActionId,
        update: ActionUpdate,
        now: DateTime<Utc>,
    ) -> Result<Action, DbError>;

    /// Remove an action for good. Fails with `NotFound` if absent.
    async fn delete_action(&self, id: ActionId) -> Result<Action, DbError>;
}

/// A complete backing store.
#[async_trait]
pub trait Store: DecisionStore + ActionStore {
    /// Check the store is reachable.
    async fn health_check(&self) -> Result<(), DbError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use placement_testing::{ActionBuilder, DecisionBuilder};

    #[test]
    fn test_db_config_defaults() {
        let config = DbConfig::default();
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_connections, 1);
    }

    #[test]
    fn test_db_config_ignores_unparseable_numbers() {
        let config = DbConfig::from_lookup(|key| match key {
            "DB_MAX_CONNECTIONS" => Some("lots".to_string()),
            "DB_MIN_CONNECTIONS" => Some("3".to_string()),
            _ => None,
        });
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_connections, 3);
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
    }

    #[test]
    fn test_page_window() {
        let page = Page { skip: 2, limit: 3 };
        assert_eq!(page.window(0..10), vec![2, 3, 4]);
        let past_end = Page { skip: 20, limit: 3 };
        assert!(past_end.window(0..10).is_empty());
    }

    #[test]
    fn test_decision_filter_hides_deleted() {
        let mut d = DecisionBuilder::new().build();
        let filter = DecisionFilter::default();
        assert!(filter.matches(&d));

        d.deleted_at = Some(Utc::now());
        assert!(!filter.matches(&d));
        assert!(DecisionFilter {
            include_deleted: true,
            ..Default::default()
        }
        .matches(&d));
    }

    #[test]
    fn test_decision_filter_is_conjunctive() {
        let d = DecisionBuilder::new().node("worker-1").queue("batch").build();
        let both = DecisionFilter {
            node_name: Some("worker-1".into()),
            queue_name: Some("batch".into()),
            ..Default::default()
        };
        let wrong_queue = DecisionFilter {
            node_name: Some("worker-1".into()),
            queue_name: Some("default".into()),
            ..Default::default()
        };
        assert!(both.matches(&d));
        assert!(!wrong_queue.matches(&d));
    }

    #[test]
    fn test_action_filter_node_matches_any_side() {
        let a = ActionBuilder::new(ActionType::Move)
            .triple("web-0", "default", "worker-2")
            .source("web-0", "default", "worker-1")
            .build();
        for node in ["worker-1", "worker-2"] {
            let filter = ActionFilter {
                node_name: Some(node.to_string()),
                ..Default::default()
            };
            assert!(filter.matches(&a), "{node}");
        }
        let other = ActionFilter {
            node_name: Some("worker-3".into()),
            ..Default::default()
        };
        assert!(!other.matches(&a));
    }

    #[test]
    fn test_action_filter_parent_type_and_columns() {
        let a = ActionBuilder::new(ActionType::Bind)
            .kind(PodParentKind::StatefulSet)
            .triple("db-0", "data", "worker-4")
            .build();

        let by_type = ActionFilter {
            pod_parent_type: Some(PodParentKind::StatefulSet),
            ..Default::default()
        };
        assert!(by_type.matches(&a));
        let wrong_type = ActionFilter {
            pod_parent_type: Some(PodParentKind::Deployment),
            ..Default::default()
        };
        assert!(!wrong_type.matches(&a));

        let by_columns = ActionFilter {
            columns: TripleColumns {
                bound_pod_name: Some("db-0".into()),
                bound_node_name: Some("worker-4".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(by_columns.matches(&a));

        let other_side = ActionFilter {
            columns: TripleColumns {
                created_pod_name: Some("db-0".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(!other_side.matches(&a));
    }
}
