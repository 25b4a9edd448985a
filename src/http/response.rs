//! Error responses.
//!
//! Every failure leaves the API as `{"error", "message", "retryable"}` with a
//! status derived from the error kind.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::error::EngineError;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    pub retryable: bool,
}

/// Error returned by every API handler.
#[derive(Debug)]
pub enum ApiError {
    Engine(EngineError),
    BadRequest(String),
    Unauthorized,
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Engine(err) => engine_status(err),
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
        }
    }

    fn body(&self) -> ErrorBody {
        match self {
            ApiError::Engine(err) => ErrorBody {
                error: err.kind(),
                message: err.to_string(),
                retryable: err.is_retryable(),
            },
            ApiError::BadRequest(message) => ErrorBody {
                error: "validation",
                message: message.clone(),
                retryable: false,
            },
            ApiError::Unauthorized => ErrorBody {
                error: "unauthorized",
                message: "missing or invalid bearer token".to_string(),
                retryable: false,
            },
        }
    }
}

fn engine_status(err: &EngineError) -> StatusCode {
    match err {
        EngineError::Validation(_) => StatusCode::BAD_REQUEST,
        EngineError::NotFound { .. } => StatusCode::NOT_FOUND,
        EngineError::PolicyViolation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        EngineError::InvalidStateTransition { .. }
        | EngineError::WaitingPeriodActive { .. }
        | EngineError::CycleDetected { .. }
        | EngineError::ParentAlreadyAssigned { .. }
        | EngineError::TransactionExpired { .. }
        | EngineError::HierarchyDepthExceeded { .. } => StatusCode::CONFLICT,
        EngineError::VerificationRequired { .. } => StatusCode::PRECONDITION_FAILED,
        EngineError::ThresholdUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        ApiError::Engine(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = self.body();
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error = body.error, message = %body.message, "Request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = body.error, message = %body.message, "Request rejected");
        }
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PolicyRule;
    use uuid::Uuid;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (EngineError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (EngineError::not_found("transaction", Uuid::nil()), StatusCode::NOT_FOUND),
            (EngineError::policy(PolicyRule::Cooldown, "wait"), StatusCode::UNPROCESSABLE_ENTITY),
            (
                EngineError::CycleDetected { parent: Uuid::nil(), child: Uuid::nil() },
                StatusCode::CONFLICT,
            ),
            (
                EngineError::VerificationRequired { request_id: Uuid::nil() },
                StatusCode::PRECONDITION_FAILED,
            ),
            (
                EngineError::ThresholdUnavailable { wallet_id: Uuid::nil(), online: 0, threshold: 2 },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn test_body_carries_kind_and_retryable() {
        let err = ApiError::from(EngineError::ThresholdUnavailable {
            wallet_id: Uuid::nil(),
            online: 1,
            threshold: 2,
        });
        let body = err.body();
        assert_eq!(body.error, "threshold_unavailable");
        assert!(body.retryable);
    }
}
