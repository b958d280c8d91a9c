//! RFC 7807 problem responses.

use axum::{
    http::{header::CONTENT_TYPE, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::db::Resource;
use crate::service::{ConflictReason, ServiceError};

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub r#type: String,
    pub title: String,
    pub status: u16,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    pub code: String,
    pub request_id: String,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<FieldError>>,
}

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl ProblemDetails {
    fn new(status: StatusCode, code: impl Into<String>, detail: impl Into<String>) -> Self {
        let code = code.into();
        let title = status
            .canonical_reason()
            .unwrap_or("Unknown Error")
            .to_string();
        Self {
            r#type: format!("https://placement-ledger.dev/problems/{code}"),
            title,
            status: status.as_u16(),
            detail: detail.into(),
            instance: None,
            code,
            request_id: "unknown".to_string(),
            retryable: false,
            details: None,
        }
    }

    fn set_request_id(&mut self, request_id: impl Into<String>) {
        let request_id = request_id.into();
        self.request_id = request_id.clone();
        if self.instance.is_none() {
            self.instance = Some(request_id);
        }
    }
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub problem: Box<ProblemDetails>,
}

impl ApiError {
    fn with_status(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        let problem = Box::new(ProblemDetails::new(status, code, message));
        Self { status, problem }
    }

    pub fn bad_request(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::BAD_REQUEST, code, message)
    }

    /// 400 `validation_error`.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::bad_request("validation_error", message)
    }

    pub fn not_found(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::NOT_FOUND, code, message)
    }

    pub fn conflict(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::CONFLICT, code, message)
    }

    pub fn internal(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::INTERNAL_SERVER_ERROR, code, message)
    }

    pub fn service_unavailable(code: impl Into<String>, message: impl Into<String>) -> Self {
        let mut err = Self::with_status(StatusCode::SERVICE_UNAVAILABLE, code, message);
        err.problem.retryable = true;
        err
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.problem.set_request_id(request_id);
        self
    }

    pub fn with_details(mut self, details: Vec<FieldError>) -> Self {
        self.problem.details = Some(details);
        self
    }

    pub fn code(&self) -> &str {
        &self.problem.code
    }
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::Validation {
                message,
                violations,
            } => {
                let err = Self::validation(message);
                if violations.is_empty() {
                    err
                } else {
                    err.with_details(
                        violations
                            .into_iter()
                            .map(|v| FieldError {
                                field: v.field,
                                message: v.message,
                            })
                            .collect(),
                    )
                }
            }
            ServiceError::NotFound { resource, id } => {
                let code = match resource {
                    Resource::Decision => "decision_not_found",
                    Resource::Action => "action_not_found",
                };
                Self::not_found(code, format!("{resource} {id} not found"))
            }
            ServiceError::Conflict {
                reason, message, ..
            } => {
                let code = match reason {
                    ConflictReason::InvalidTransition => "invalid_transition",
                    ConflictReason::AlreadyExists => "already_exists",
                };
                Self::conflict(code, message)
            }
            ServiceError::Storage(db) if db.is_unavailable() => {
                Self::service_unavailable("storage_unavailable", "Storage is unavailable")
            }
            ServiceError::Storage(_) => Self::internal("storage_error", "Storage operation failed"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.problem)).into_response();
        response.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/problem+json"),
        );
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbError;
    use rstest::rstest;

    #[rstest]
    #[case(ServiceError::validation("bad"), StatusCode::BAD_REQUEST, "validation_error")]
    #[case(
        ServiceError::NotFound { resource: Resource::Decision, id: "x".into() },
        StatusCode::NOT_FOUND,
        "decision_not_found"
    )]
    #[case(
        ServiceError::NotFound { resource: Resource::Action, id: "x".into() },
        StatusCode::NOT_FOUND,
        "action_not_found"
    )]
    #[case(
        ServiceError::Conflict {
            resource: Resource::Decision,
            reason: ConflictReason::InvalidTransition,
            message: "no".into(),
        },
        StatusCode::CONFLICT,
        "invalid_transition"
    )]
    #[case(
        ServiceError::Conflict {
            resource: Resource::Action,
            reason: ConflictReason::AlreadyExists,
            message: "no".into(),
        },
        StatusCode::CONFLICT,
        "already_exists"
    )]
    #[case(
        ServiceError::Storage(DbError::Query(sqlx::Error::PoolTimedOut)),
        StatusCode::SERVICE_UNAVAILABLE,
        "storage_unavailable"
    )]
    #[case(
        ServiceError::Storage(DbError::InvalidColumn { column: "action_type", value: "x".into() }),
        StatusCode::INTERNAL_SERVER_ERROR,
        "storage_error"
    )]
    fn test_service_error_mapping(
        #[case] err: ServiceError,
        #[case] status: StatusCode,
        #[case] code: &str,
    ) {
        let api = ApiError::from(err);
        assert_eq!(api.status, status);
        assert_eq!(api.code(), code);
        assert_eq!(api.problem.retryable, status == StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_problem_content_type() {
        let response = ApiError::validation("nope")
            .with_request_id("req-1")
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/problem+json"
        );
    }
}
