use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::kernel::jobs::{ErrorCode, JobsError, StoreError};

/// Error returned by HTTP handlers.
///
/// Every variant renders as `{success:false, error:{code, message, details}}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{message}")]
    InvalidInput { message: String, details: Value },

    #[error("job not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ApiError::InvalidInput { .. } => ErrorCode::InvalidInput,
            ApiError::NotFound(_) => ErrorCode::NotFound,
            ApiError::Conflict(_) | ApiError::Internal(_) => ErrorCode::Internal,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn not_found(job_id: impl ToString) -> Self {
        ApiError::NotFound(job_id.to_string())
    }
}

impl From<JobsError> for ApiError {
    fn from(err: JobsError) -> Self {
        match err {
            JobsError::InvalidInput { field, message } => ApiError::InvalidInput {
                message: format!("invalid {}: {}", field, message),
                details: json!({ "field": field }),
            },
            JobsError::NotFound(id) => ApiError::not_found(id),
            JobsError::WorkerActive(_) | JobsError::AlreadyFinished(_) => {
                ApiError::Conflict(err.to_string())
            }
            JobsError::Store(StoreError::NotFound(id)) => ApiError::not_found(id),
            JobsError::Store(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InvalidInput {
            message: rejection.body_text(),
            details: Value::Null,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (message, details) = match &self {
            ApiError::InvalidInput { message, details } => (message.clone(), details.clone()),
            ApiError::NotFound(id) => (format!("job {} not found", id), Value::Null),
            ApiError::Conflict(message) => (message.clone(), Value::Null),
            ApiError::Internal(message) => {
                tracing::error!(error = %message, "Internal error");
                ("An internal error occurred".to_string(), Value::Null)
            }
        };

        let body = json!({
            "success": false,
            "error": {
                "code": self.code(),
                "message": message,
                "details": details,
            }
        });

        (self.status(), axum::Json(body)).into_response()
    }
}

/// Parse a path job id. Malformed ids cannot name a job, so they are
/// reported as not found.
pub fn parse_job_id(raw: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| ApiError::not_found(raw))
}
