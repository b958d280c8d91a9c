//! HTTP API handlers and routing.

mod actions;
mod decisions;
pub mod error;
mod extract;
mod flow;
mod health;
pub mod request_context;

use axum::{
    http::{header, HeaderName, Method},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::service::ServiceError;
use crate::state::AppState;
use error::ApiError;

/// Create the main API router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static(request_context::REQUEST_ID_HEADER),
        ])
        .allow_origin(Any);

    Router::new()
        .merge(health::routes())
        .merge(decisions::routes())
        .merge(actions::routes())
        .merge(flow::routes())
        // Middleware
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}

/// Turn a service error into a problem response, logging storage failures.
pub(crate) fn service_error(e: ServiceError, request_id: &str, context: &str) -> ApiError {
    match &e {
        ServiceError::Storage(db) => {
            tracing::error!(error = %db, request_id = %request_id, "{context}");
        }
        other => {
            tracing::debug!(error = %other, request_id = %request_id, "{context}");
        }
    }
    ApiError::from(e).with_request_id(request_id.to_string())
}
