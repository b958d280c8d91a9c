//! Decision/action flow endpoint.

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use placement_id::{ActionId, DecisionId};
use placement_model::ActionType;
use serde::Deserialize;

use crate::api::error::ApiError;
use crate::api::extract::ApiQuery;
use crate::api::request_context::RequestContext;
use crate::api::service_error;
use crate::service::{self, FlowFilter};
use crate::state::AppState;

const COLLECTION: &str = "/workload-decision-action-flow";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(COLLECTION, get(list_flow))
        .route(&format!("{COLLECTION}/"), get(list_flow))
}

#[derive(Debug, Default, Deserialize)]
pub struct FlowQuery {
    pub decision_id: Option<DecisionId>,
    pub action_id: Option<ActionId>,
    pub pod_name: Option<String>,
    pub namespace: Option<String>,
    pub node_name: Option<String>,
    pub action_type: Option<ActionType>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

async fn list_flow(
    State(state): State<AppState>,
    ctx: RequestContext,
    ApiQuery(query): ApiQuery<FlowQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let request_id = ctx.request_id;
    let page = service::page(query.skip, query.limit)
        .map_err(|e| service_error(e, &request_id, "Invalid pagination"))?;

    let filter = FlowFilter {
        decision_id: query.decision_id,
        action_id: query.action_id,
        pod_name: query.pod_name,
        namespace: query.namespace,
        node_name: query.node_name,
        action_type: query.action_type,
    };

    let entries = state
        .service()
        .list_flow(filter, page)
        .await
        .map_err(|e| service_error(e, &request_id, "Failed to list flow"))?;

    Ok(Json(entries))
}
