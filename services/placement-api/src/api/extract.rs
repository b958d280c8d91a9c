//! Extractors that report malformed input as `validation_error` problems.
//!
//! axum's own `Json` and `Query` rejections are plain-text; these wrap them
//! so every bad request gets the same problem+json body.

use axum::extract::{FromRequest, FromRequestParts, Query, Request};
use axum::http::request::Parts;
use axum::Json;
use placement_id::IdError;
use serde::de::DeserializeOwned;

use crate::api::error::ApiError;
use crate::api::request_context::request_id;

/// JSON request body.
#[derive(Debug, Clone)]
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let request_id = request_id(req.headers());
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => {
                Err(ApiError::validation(rejection.body_text()).with_request_id(request_id))
            }
        }
    }
}

/// Query string.
#[derive(Debug, Clone)]
pub struct ApiQuery<T>(pub T);

impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(Self(value)),
            Err(rejection) => Err(ApiError::validation(rejection.body_text())
                .with_request_id(request_id(&parts.headers))),
        }
    }
}

/// Parse a path segment into a typed id.
pub fn path_id<T>(raw: &str, request_id: &str) -> Result<T, ApiError>
where
    T: std::str::FromStr<Err = IdError>,
{
    raw.parse::<T>().map_err(|e| {
        ApiError::validation(format!("invalid id {raw:?}: {e}"))
            .with_request_id(request_id.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use placement_id::DecisionId;

    #[test]
    fn test_path_id_rejects_garbage() {
        let err = path_id::<DecisionId>("not-a-uuid", "req-1").unwrap_err();
        assert_eq!(err.code(), "validation_error");
        assert_eq!(err.problem.request_id, "req-1");

        let id = DecisionId::new();
        assert_eq!(path_id::<DecisionId>(&id.to_string(), "req-1").unwrap(), id);
    }
}
