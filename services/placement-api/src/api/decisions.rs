//! Decision endpoints.
//!
//! Schedulers post decisions here; operators list, inspect, settle and
//! reconcile them.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use placement_id::{DecisionId, PodParentId};
use placement_model::{ActionType, NewDecision, PodParentKind, Status};
use serde::Deserialize;

use crate::api::error::ApiError;
use crate::api::extract::{path_id, ApiJson, ApiQuery};
use crate::api::request_context::RequestContext;
use crate::api::service_error;
use crate::db::DecisionFilter;
use crate::service;
use crate::state::AppState;

const COLLECTION: &str = "/workload-request-decisions";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(COLLECTION, get(list_decisions).post(create_decision))
        .route(
            &format!("{COLLECTION}/"),
            get(list_decisions).post(create_decision),
        )
        .route(
            &format!("{COLLECTION}/{{id}}"),
            get(get_decision).put(update_decision).delete(delete_decision),
        )
        .route(&format!("{COLLECTION}/{{id}}/reconcile"), get(reconcile))
}

// =============================================================================
// Request Types
// =============================================================================

/// Query parameters for listing decisions.
#[derive(Debug, Default, Deserialize)]
pub struct ListDecisionsQuery {
    pub node_name: Option<String>,
    /// Decision status.
    pub status: Option<Status>,
    pub queue_name: Option<String>,
    pub pod_parent_kind: Option<PodParentKind>,
    pub namespace: Option<String>,
    pub pod_name: Option<String>,
    pub action_type: Option<ActionType>,
    pub pod_parent_id: Option<PodParentId>,
    #[serde(default)]
    pub include_deleted: bool,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

impl From<ListDecisionsQuery> for DecisionFilter {
    fn from(q: ListDecisionsQuery) -> Self {
        Self {
            id: None,
            node_name: q.node_name,
            decision_status: q.status,
            queue_name: q.queue_name,
            pod_parent_kind: q.pod_parent_kind,
            namespace: q.namespace,
            pod_name: q.pod_name,
            action_type: q.action_type,
            pod_parent_id: q.pod_parent_id,
            include_deleted: q.include_deleted,
        }
    }
}

/// Request to change a decision's status.
#[derive(Debug, Deserialize)]
pub struct UpdateDecisionRequest {
    pub decision_status: Status,

    /// Allow overwriting a terminal status.
    #[serde(default)]
    pub force: bool,
}

// =============================================================================
// Handlers
// =============================================================================

async fn create_decision(
    State(state): State<AppState>,
    ctx: RequestContext,
    ApiJson(body): ApiJson<NewDecision>,
) -> Result<impl IntoResponse, ApiError> {
    let decision = state
        .service()
        .create_decision(body)
        .await
        .map_err(|e| service_error(e, &ctx.request_id, "Failed to create decision"))?;

    Ok((StatusCode::CREATED, Json(decision)))
}

async fn list_decisions(
    State(state): State<AppState>,
    ctx: RequestContext,
    ApiQuery(query): ApiQuery<ListDecisionsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let request_id = ctx.request_id;
    let page = service::page(query.skip, query.limit)
        .map_err(|e| service_error(e, &request_id, "Invalid pagination"))?;

    let decisions = state
        .service()
        .list_decisions(query.into(), page)
        .await
        .map_err(|e| service_error(e, &request_id, "Failed to list decisions"))?;

    Ok(Json(decisions))
}

async fn get_decision(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id: DecisionId = path_id(&id, &ctx.request_id)?;

    let decision = state
        .service()
        .get_decision(id)
        .await
        .map_err(|e| service_error(e, &ctx.request_id, "Failed to get decision"))?;

    Ok(Json(decision))
}

async fn update_decision(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<UpdateDecisionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id: DecisionId = path_id(&id, &ctx.request_id)?;

    let decision = state
        .service()
        .update_decision(id, body.decision_status, body.force)
        .await
        .map_err(|e| service_error(e, &ctx.request_id, "Failed to update decision"))?;

    Ok(Json(decision))
}

async fn delete_decision(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id: DecisionId = path_id(&id, &ctx.request_id)?;

    state
        .service()
        .delete_decision(id)
        .await
        .map_err(|e| service_error(e, &ctx.request_id, "Failed to delete decision"))?;

    Ok(StatusCode::NO_CONTENT)
}

async fn reconcile(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id: DecisionId = path_id(&id, &ctx.request_id)?;

    let outcome = state
        .service()
        .reconcile(id)
        .await
        .map_err(|e| service_error(e, &ctx.request_id, "Failed to reconcile decision"))?;

    Ok(Json(outcome))
}
