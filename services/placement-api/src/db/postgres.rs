//! Postgres-backed store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use placement_correlation::MatchKey;
use placement_id::{ActionId, DecisionId, NodeId, PodId, PodParentId, Uuid};
use placement_model::{
    Action, ActionTarget, ActionType, ActionUpdate, Decision, PodParentKind, Status,
    Transition, TripleColumns,
};
use sqlx::{
    postgres::{PgPool, PgRow},
    Postgres, QueryBuilder, Row,
};

use super::{
    ActionFilter, ActionStore, DbError, DecisionFilter, DecisionStore, Page, Resource, Store,
};

const DECISION_COLUMNS: &str = "id, pod_id, pod_name, namespace, node_id, node_name, \
    is_elastic, queue_name, demand_cpu, demand_memory, demand_slack_cpu, demand_slack_memory, \
    decision_status, pod_parent_id, pod_parent_name, pod_parent_kind, action_type, \
    decision_start_time, decision_end_time, created_at, deleted_at";

const ACTION_COLUMNS: &str = "id, action_type, action_status, action_start_time, \
    action_end_time, action_reason, pod_parent_name, pod_parent_type, pod_parent_uid, \
    created_pod_name, created_pod_namespace, created_node_name, \
    deleted_pod_name, deleted_pod_namespace, deleted_node_name, \
    bound_pod_name, bound_pod_namespace, bound_node_name, created_at, updated_at";

// =============================================================================
// Rows
// =============================================================================

/// Raw decision row; enum columns are still text.
struct DecisionRow {
    id: Uuid,
    pod_id: Uuid,
    pod_name: String,
    namespace: String,
    node_id: Uuid,
    node_name: String,
    is_elastic: bool,
    queue_name: String,
    demand_cpu: f64,
    demand_memory: f64,
    demand_slack_cpu: Option<f64>,
    demand_slack_memory: Option<f64>,
    decision_status: String,
    pod_parent_id: Uuid,
    pod_parent_name: String,
    pod_parent_kind: String,
    action_type: String,
    decision_start_time: DateTime<Utc>,
    decision_end_time: DateTime<Utc>,
    created_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for DecisionRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            pod_id: row.try_get("pod_id")?,
            pod_name: row.try_get("pod_name")?,
            namespace: row.try_get("namespace")?,
            node_id: row.try_get("node_id")?,
            node_name: row.try_get("node_name")?,
            is_elastic: row.try_get("is_elastic")?,
            queue_name: row.try_get("queue_name")?,
            demand_cpu: row.try_get("demand_cpu")?,
            demand_memory: row.try_get("demand_memory")?,
            demand_slack_cpu: row.try_get("demand_slack_cpu")?,
            demand_slack_memory: row.try_get("demand_slack_memory")?,
            decision_status: row.try_get("decision_status")?,
            pod_parent_id: row.try_get("pod_parent_id")?,
            pod_parent_name: row.try_get("pod_parent_name")?,
            pod_parent_kind: row.try_get("pod_parent_kind")?,
            action_type: row.try_get("action_type")?,
            decision_start_time: row.try_get("decision_start_time")?,
            decision_end_time: row.try_get("decision_end_time")?,
            created_at: row.try_get("created_at")?,
            deleted_at: row.try_get("deleted_at")?,
        })
    }
}

fn column<T, E>(column: &'static str, value: &str, parsed: Result<T, E>) -> Result<T, DbError> {
    parsed.map_err(|_| DbError::InvalidColumn {
        column,
        value: value.to_string(),
    })
}

impl TryFrom<DecisionRow> for Decision {
    type Error = DbError;

    fn try_from(row: DecisionRow) -> Result<Self, Self::Error> {
        let decision_status = column(
            "decision_status",
            &row.decision_status,
            Status::parse_decision_status(&row.decision_status),
        )?;
        let pod_parent_kind = column(
            "pod_parent_kind",
            &row.pod_parent_kind,
            PodParentKind::parse_kind(&row.pod_parent_kind),
        )?;
        let action_type = column(
            "action_type",
            &row.action_type,
            row.action_type.parse::<ActionType>(),
        )?;

        Ok(Decision {
            id: DecisionId::from_uuid(row.id),
            pod_id: PodId::from_uuid(row.pod_id),
            pod_name: row.pod_name,
            namespace: row.namespace,
            node_id: NodeId::from_uuid(row.node_id),
            node_name: row.node_name,
            is_elastic: row.is_elastic,
            queue_name: row.queue_name,
            demand_cpu: row.demand_cpu,
            demand_memory: row.demand_memory,
            demand_slack_cpu: row.demand_slack_cpu,
            demand_slack_memory: row.demand_slack_memory,
            decision_status,
            pod_parent_id: PodParentId::from_uuid(row.pod_parent_id),
            pod_parent_name: row.pod_parent_name,
            pod_parent_kind,
            action_type,
            decision_start_time: row.decision_start_time,
            decision_end_time: row.decision_end_time,
            created_at: row.created_at,
            deleted_at: row.deleted_at,
        })
    }
}

/// Raw action row.
struct ActionRow {
    id: Uuid,
    action_type: String,
    action_status: String,
    action_start_time: DateTime<Utc>,
    action_end_time: Option<DateTime<Utc>>,
    action_reason: String,
    pod_parent_name: String,
    pod_parent_type: String,
    pod_parent_uid: Uuid,
    columns: TripleColumns,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for ActionRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            action_type: row.try_get("action_type")?,
            action_status: row.try_get("action_status")?,
            action_start_time: row.try_get("action_start_time")?,
            action_end_time: row.try_get("action_end_time")?,
            action_reason: row.try_get("action_reason")?,
            pod_parent_name: row.try_get("pod_parent_name")?,
            pod_parent_type: row.try_get("pod_parent_type")?,
            pod_parent_uid: row.try_get("pod_parent_uid")?,
            columns: TripleColumns {
                created_pod_name: row.try_get("created_pod_name")?,
                created_pod_namespace: row.try_get("created_pod_namespace")?,
                created_node_name: row.try_get("created_node_name")?,
                deleted_pod_name: row.try_get("deleted_pod_name")?,
                deleted_pod_namespace: row.try_get("deleted_pod_namespace")?,
                deleted_node_name: row.try_get("deleted_node_name")?,
                bound_pod_name: row.try_get("bound_pod_name")?,
                bound_pod_namespace: row.try_get("bound_pod_namespace")?,
                bound_node_name: row.try_get("bound_node_name")?,
            },
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl TryFrom<ActionRow> for Action {
    type Error = DbError;

    fn try_from(row: ActionRow) -> Result<Self, Self::Error> {
        let action_type = column(
            "action_type",
            &row.action_type,
            row.action_type.parse::<ActionType>(),
        )?;
        let action_status = column(
            "action_status",
            &row.action_status,
            Status::parse_action_status(&row.action_status),
        )?;
        let pod_parent_type = column(
            "pod_parent_type",
            &row.pod_parent_type,
            PodParentKind::parse_type(&row.pod_parent_type),
        )?;
        let id = ActionId::from_uuid(row.id);
        let target = ActionTarget::from_columns(action_type, row.columns).map_err(|e| {
            DbError::InvalidColumn {
                column: "action_type",
                value: format!("{action_type} ({e})"),
            }
        })?;

        Ok(Action {
            id,
            target,
            action_status,
            action_start_time: row.action_start_time,
            action_end_time: row.action_end_time,
            action_reason: row.action_reason,
            pod_parent_name: row.pod_parent_name,
            pod_parent_type,
            pod_parent_uid: PodParentId::from_uuid(row.pod_parent_uid),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_records<R, T>(rows: Vec<R>) -> Result<Vec<T>, DbError>
where
    T: TryFrom<R, Error = DbError>,
{
    rows.into_iter().map(T::try_from).collect()
}

// =============================================================================
// Store
// =============================================================================

/// Store over a Postgres pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_decision(
        &self,
        id: DecisionId,
        include_deleted: bool,
    ) -> Result<Option<Decision>, DbError> {
        let row = sqlx::query_as::<_, DecisionRow>(&format!(
            "SELECT {DECISION_COLUMNS} FROM workload_request_decision \
             WHERE id = $1 AND ($2 OR deleted_at IS NULL)"
        ))
        .bind(id.as_uuid())
        .bind(include_deleted)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::Query)?;

        row.map(Decision::try_from).transpose()
    }
}

fn push_decision_filter<'a>(qb: &mut QueryBuilder<'a, Postgres>, filter: &'a DecisionFilter) {
    if !filter.include_deleted {
        qb.push(" AND deleted_at IS NULL");
    }
    if let Some(id) = filter.id {
        qb.push(" AND id = ").push_bind(id.as_uuid());
    }
    if let Some(node_name) = &filter.node_name {
        qb.push(" AND node_name = ").push_bind(node_name.as_str());
    }
    if let Some(status) = filter.decision_status {
        qb.push(" AND decision_status = ")
            .push_bind(status.as_str());
    }
    if let Some(queue_name) = &filter.queue_name {
        qb.push(" AND queue_name = ").push_bind(queue_name.as_str());
    }
    if let Some(kind) = filter.pod_parent_kind {
        qb.push(" AND pod_parent_kind = ").push_bind(kind.as_str());
    }
    if let Some(namespace) = &filter.namespace {
        qb.push(" AND namespace = ").push_bind(namespace.as_str());
    }
    if let Some(pod_name) = &filter.pod_name {
        qb.push(" AND pod_name = ").push_bind(pod_name.as_str());
    }
    if let Some(action_type) = filter.action_type {
        qb.push(" AND action_type = ").push_bind(action_type.as_str());
    }
    if let Some(parent) = filter.pod_parent_id {
        qb.push(" AND pod_parent_id = ").push_bind(parent.as_uuid());
    }
}

fn push_action_filter<'a>(qb: &mut QueryBuilder<'a, Postgres>, filter: &'a ActionFilter) {
    if let Some(action_type) = filter.action_type {
        qb.push(" AND action_type = ").push_bind(action_type.as_str());
    }
    if let Some(status) = filter.action_status {
        qb.push(" AND action_status = ").push_bind(status.as_str());
    }
    if let Some(parent) = filter.pod_parent_uid {
        qb.push(" AND pod_parent_uid = ").push_bind(parent.as_uuid());
    }
    if let Some(name) = &filter.pod_parent_name {
        qb.push(" AND pod_parent_name = ").push_bind(name.as_str());
    }
    if let Some(kind) = filter.pod_parent_type {
        qb.push(" AND pod_parent_type = ").push_bind(kind.as_str());
    }
    for (column, value) in filter.columns.entries() {
        if let Some(value) = value {
            qb.push(format_args!(" AND {column} = ")).push_bind(value);
        }
    }
    if let Some(node) = &filter.node_name {
        qb.push(" AND (created_node_name = ")
            .push_bind(node.as_str())
            .push(" OR deleted_node_name = ")
            .push_bind(node.as_str())
            .push(" OR bound_node_name = ")
            .push_bind(node.as_str())
            .push(")");
    }
}

fn push_page(qb: &mut QueryBuilder<'_, Postgres>, page: Page) {
    qb.push(" LIMIT ")
        .push_bind(page.limit)
        .push(" OFFSET ")
        .push_bind(page.skip);
}

#[async_trait]
impl DecisionStore for PgStore {
    async fn insert_decision(&self, d: &Decision) -> Result<(), DbError> {
        sqlx::query(&format!(
            "INSERT INTO workload_request_decision ({DECISION_COLUMNS}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, \
              $18, $19, $20, $21)"
        ))
        .bind(d.id.as_uuid())
        .bind(d.pod_id.as_uuid())
        .bind(&d.pod_name)
        .bind(&d.namespace)
        .bind(d.node_id.as_uuid())
        .bind(&d.node_name)
        .bind(d.is_elastic)
        .bind(&d.queue_name)
        .bind(d.demand_cpu)
        .bind(d.demand_memory)
        .bind(d.demand_slack_cpu)
        .bind(d.demand_slack_memory)
        .bind(d.decision_status.as_str())
        .bind(d.pod_parent_id.as_uuid())
        .bind(&d.pod_parent_name)
        .bind(d.pod_parent_kind.as_str())
        .bind(d.action_type.as_str())
        .bind(d.decision_start_time)
        .bind(d.decision_end_time)
        .bind(d.created_at)
        .bind(d.deleted_at)
        .execute(&self.pool)
        .await
        .map_err(|e| DbError::on_insert(e, Resource::Decision, d.id))?;

        Ok(())
    }

    async fn get_decision(&self, id: DecisionId) -> Result<Option<Decision>, DbError> {
        self.fetch_decision(id, false).await
    }

    async fn list_decisions(
        &self,
        filter: &DecisionFilter,
        page: Page,
    ) -> Result<Vec<Decision>, DbError> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {DECISION_COLUMNS} FROM workload_request_decision WHERE TRUE"
        ));
        push_decision_filter(&mut qb, filter);
        qb.push(" ORDER BY created_at DESC, id ASC");
        push_page(&mut qb, page);

        let rows = qb
            .build_query_as::<DecisionRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::Query)?;

        into_records(rows)
    }

    async fn update_decision_status(
        &self,
        id: DecisionId,
        to: Status,
        force: bool,
    ) -> Result<(Decision, Transition), DbError> {
        let mut tx = self.pool.begin().await.map_err(DbError::Query)?;

        let row = sqlx::query_as::<_, DecisionRow>(&format!(
            "SELECT {DECISION_COLUMNS} FROM workload_request_decision \
             WHERE id = $1 AND deleted_at IS NULL FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(DbError::Query)?;

        let Some(row) = row else {
            return Err(DbError::NotFound {
                resource: Resource::Decision,
                id: id.to_string(),
            });
        };
        let mut decision = Decision::try_from(row)?;

        let transition = decision.set_status(to, force)?;
        if transition.is_write() {
            sqlx::query("UPDATE workload_request_decision SET decision_status = $2 WHERE id = $1")
                .bind(id.as_uuid())
                .bind(to.as_str())
                .execute(&mut *tx)
                .await
                .map_err(DbError::Query)?;
        }

        tx.commit().await.map_err(DbError::Query)?;
        Ok((decision, transition))
    }

    async fn soft_delete_decision(
        &self,
        id: DecisionId,
        at: DateTime<Utc>,
    ) -> Result<Decision, DbError> {
        let row = sqlx::query_as::<_, DecisionRow>(&format!(
            "UPDATE workload_request_decision SET deleted_at = $2 \
             WHERE id = $1 AND deleted_at IS NULL RETURNING {DECISION_COLUMNS}"
        ))
        .bind(id.as_uuid())
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::Query)?;

        match row {
            Some(row) => Decision::try_from(row),
            None => Err(DbError::NotFound {
                resource: Resource::Decision,
                id: id.to_string(),
            }),
        }
    }
}

#[async_trait]
impl ActionStore for PgStore {
    async fn insert_action(&self, a: &Action) -> Result<(), DbError> {
        let cols = a.target.to_columns();

        sqlx::query(&format!(
            "INSERT INTO workload_action ({ACTION_COLUMNS}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, \
              $18, $19, $20)"
        ))
        .bind(a.id.as_uuid())
        .bind(a.action_type().as_str())
        .bind(a.action_status.as_str())
        .bind(a.action_start_time)
        .bind(a.action_end_time)
        .bind(&a.action_reason)
        .bind(&a.pod_parent_name)
        .bind(a.pod_parent_type.as_str())
        .bind(a.pod_parent_uid.as_uuid())
        .bind(cols.created_pod_name)
        .bind(cols.created_pod_namespace)
        .bind(cols.created_node_name)
        .bind(cols.deleted_pod_name)
        .bind(cols.deleted_pod_namespace)
        .bind(cols.deleted_node_name)
        .bind(cols.bound_pod_name)
        .bind(cols.bound_pod_namespace)
        .bind(cols.bound_node_name)
        .bind(a.created_at)
        .bind(a.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| DbError::on_insert(e, Resource::Action, a.id))?;

        Ok(())
    }

    async fn get_action(&self, id: ActionId) -> Result<Option<Action>, DbError> {
        let row = sqlx::query_as::<_, ActionRow>(&format!(
            "SELECT {ACTION_COLUMNS} FROM workload_action WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::Query)?;

        row.map(Action::try_from).transpose()
    }

    async fn list_actions(
        &self,
        filter: &ActionFilter,
        page: Page,
    ) -> Result<Vec<Action>, DbError> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {ACTION_COLUMNS} FROM workload_action WHERE TRUE"
        ));
        push_action_filter(&mut qb, filter);
        qb.push(" ORDER BY action_start_time DESC, id ASC");
        push_page(&mut qb, page);

        let rows = qb
            .build_query_as::<ActionRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::Query)?;

        into_records(rows)
    }

    async fn actions_for_keys(&self, keys: &[MatchKey]) -> Result<Vec<Action>, DbError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let parents: Vec<Uuid> = keys.iter().map(|k| k.pod_parent.as_uuid()).collect();
        let types: Vec<String> = keys
            .iter()
            .map(|k| k.action_type.as_str().to_string())
            .collect();

        let rows = sqlx::query_as::<_, ActionRow>(&format!(
            "SELECT {ACTION_COLUMNS} FROM workload_action \
             WHERE (pod_parent_uid, action_type) IN \
                   (SELECT * FROM UNNEST($1::uuid[], $2::text[]))"
        ))
        .bind(parents)
        .bind(types)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::Query)?;

        into_records(rows)
    }

    async fn update_action(
        &self,
        id: ActionId,
        update: ActionUpdate,
        now: DateTime<Utc>,
    ) -> Result<Action, DbError> {
        let mut tx = self.pool.begin().await.map_err(DbError::Query)?;

        let row = sqlx::query_as::<_, ActionRow>(&format!(
            "SELECT {ACTION_COLUMNS} FROM workload_action WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(DbError::Query)?;

        let Some(row) = row else {
            return Err(DbError::NotFound {
                resource: Resource::Action,
                id: id.to_string(),
            });
        };
        let mut action = Action::try_from(row)?;
        action.apply_update(update, now)?;
        let cols = action.target.to_columns();

        sqlx::query(
            "UPDATE workload_action \
             SET action_status = $2, action_end_time = $3, action_reason = $4, updated_at = $5, \
                 created_pod_name = $6, created_pod_namespace = $7, created_node_name = $8, \
                 deleted_pod_name = $9, deleted_pod_namespace = $10, deleted_node_name = $11, \
                 bound_pod_name = $12, bound_pod_namespace = $13, bound_node_name = $14 \
             WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(action.action_status.as_str())
        .bind(action.action_end_time)
        .bind(&action.action_reason)
        .bind(action.updated_at)
        .bind(cols.created_pod_name)
        .bind(cols.created_pod_namespace)
        .bind(cols.created_node_name)
        .bind(cols.deleted_pod_name)
        .bind(cols.deleted_pod_namespace)
        .bind(cols.deleted_node_name)
        .bind(cols.bound_pod_name)
        .bind(cols.bound_pod_namespace)
        .bind(cols.bound_node_name)
        .execute(&mut *tx)
        .await
        .map_err(DbError::Query)?;

        tx.commit().await.map_err(DbError::Query)?;
        Ok(action)
    }

    async fn delete_action(&self, id: ActionId) -> Result<Action, DbError> {
        let row = sqlx::query_as::<_, ActionRow>(&format!(
            "DELETE FROM workload_action WHERE id = $1 RETURNING {ACTION_COLUMNS}"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::Query)?;

        match row {
            Some(row) => Action::try_from(row),
            None => Err(DbError::NotFound {
                resource: Resource::Action,
                id: id.to_string(),
            }),
        }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn health_check(&self) -> Result<(), DbError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(DbError::Query)?;
        Ok(())
    }
}
