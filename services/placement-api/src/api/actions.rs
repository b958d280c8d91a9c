//! Action endpoints, called by executors as they act on pods.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use placement_id::{ActionId, PodParentId};
use placement_model::{ActionType, ActionUpdate, NewAction, PodParentKind, Status, TripleColumns};
use serde::Deserialize;

use crate::api::error::ApiError;
use crate::api::extract::{path_id, ApiJson, ApiQuery};
use crate::api::request_context::RequestContext;
use crate::api::service_error;
use crate::db::ActionFilter;
use crate::service;
use crate::state::AppState;

const COLLECTION: &str = "/workload-actions";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(COLLECTION, get(list_actions).post(create_action))
        .route(
            &format!("{COLLECTION}/"),
            get(list_actions).post(create_action),
        )
        .route(
            &format!("{COLLECTION}/{{id}}"),
            get(get_action).put(update_action).delete(delete_action),
        )
}

/// Query parameters for listing actions.
#[derive(Debug, Default, Deserialize)]
pub struct ListActionsQuery {
    pub action_type: Option<ActionType>,
    pub action_status: Option<Status>,
    pub pod_parent_uid: Option<PodParentId>,
    pub pod_parent_name: Option<String>,
    pub pod_parent_type: Option<PodParentKind>,
    /// Created, deleted or bound node.
    pub node_name: Option<String>,
    pub created_pod_name: Option<String>,
    pub created_pod_namespace: Option<String>,
    pub created_node_name: Option<String>,
    pub deleted_pod_name: Option<String>,
    pub deleted_pod_namespace: Option<String>,
    pub deleted_node_name: Option<String>,
    pub bound_pod_name: Option<String>,
    pub bound_pod_namespace: Option<String>,
    pub bound_node_name: Option<String>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

impl From<ListActionsQuery> for ActionFilter {
    fn from(q: ListActionsQuery) -> Self {
        Self {
            action_type: q.action_type,
            action_status: q.action_status,
            pod_parent_uid: q.pod_parent_uid,
            pod_parent_name: q.pod_parent_name,
            pod_parent_type: q.pod_parent_type,
            node_name: q.node_name,
            columns: TripleColumns {
                created_pod_name: q.created_pod_name,
                created_pod_namespace: q.created_pod_namespace,
                created_node_name: q.created_node_name,
                deleted_pod_name: q.deleted_pod_name,
                deleted_pod_namespace: q.deleted_pod_namespace,
                deleted_node_name: q.deleted_node_name,
                bound_pod_name: q.bound_pod_name,
                bound_pod_namespace: q.bound_pod_namespace,
                bound_node_name: q.bound_node_name,
            },
        }
    }
}

async fn create_action(
    State(state): State<AppState>,
    ctx: RequestContext,
    ApiJson(body): ApiJson<NewAction>,
) -> Result<impl IntoResponse, ApiError> {
    let action = state
        .service()
        .create_action(body)
        .await
        .map_err(|e| service_error(e, &ctx.request_id, "Failed to create action"))?;

    Ok((StatusCode::CREATED, Json(action)))
}

async fn list_actions(
    State(state): State<AppState>,
    ctx: RequestContext,
    ApiQuery(query): ApiQuery<ListActionsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let request_id = ctx.request_id;
    let page = service::page(query.skip, query.limit)
        .map_err(|e| service_error(e, &request_id, "Invalid pagination"))?;

    let actions = state
        .service()
        .list_actions(query.into(), page)
        .await
        .map_err(|e| service_error(e, &request_id, "Failed to list actions"))?;

    Ok(Json(actions))
}

async fn get_action(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id: ActionId = path_id(&id, &ctx.request_id)?;

    let action = state
        .service()
        .get_action(id)
        .await
        .map_err(|e| service_error(e, &ctx.request_id, "Failed to get action"))?;

    Ok(Json(action))
}

async fn update_action(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<ActionUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    let id: ActionId = path_id(&id, &ctx.request_id)?;

    let action = state
        .service()
        .update_action(id, body)
        .await
        .map_err(|e| service_error(e, &ctx.request_id, "Failed to update action"))?;

    Ok(Json(action))
}

async fn delete_action(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id: ActionId = path_id(&id, &ctx.request_id)?;

    state
        .service()
        .delete_action(id)
        .await
        .map_err(|e| service_error(e, &ctx.request_id, "Failed to delete action"))?;

    Ok(StatusCode::NO_CONTENT)
}
