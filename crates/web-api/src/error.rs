use application::{ApplicationError, StorageError, TRANSLATION_FAILED_MESSAGE};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                code,
                message: message.into(),
            },
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }
}

impl From<ApplicationError> for ApiError {
    fn from(error: ApplicationError) -> Self {
        use domain::DomainError;

        match error {
            ApplicationError::Domain(DomainError::Validation { field, message }) => ApiError::new(
                StatusCode::BAD_REQUEST,
                "INVALID_ARGUMENT",
                format!("{field}: {message}"),
            ),
            ApplicationError::Domain(DomainError::AccessDenied { action }) => {
                ApiError::new(StatusCode::FORBIDDEN, "ACCESS_DENIED", action)
            }
            ApplicationError::Storage(StorageError::NotFound { resource }) => {
                ApiError::new(StatusCode::NOT_FOUND, "NOT_FOUND", resource)
            }
            ApplicationError::Storage(StorageError::Storage { message }) => ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "STORAGE_ERROR",
                format!("storage error: {message}"),
            ),
            ApplicationError::RateLimited { retry_after } => {
                let message = match retry_after {
                    Some(wait) => format!("rate limit exceeded, retry in {}s", wait.as_secs().max(1)),
                    None => "rate limit exceeded".to_string(),
                };
                ApiError::new(StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED", message)
            }
            // 服务商原始错误只进日志，对外只展示统一文案
            ApplicationError::TranslationFailed { provider_errors } => {
                tracing::warn!(?provider_errors, "all translation providers exhausted");
                ApiError::new(
                    StatusCode::BAD_GATEWAY,
                    "TRANSLATION_FAILED",
                    TRANSLATION_FAILED_MESSAGE,
                )
            }
            ApplicationError::Push(err) => ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "PUSH_ERROR",
                format!("push error: {err}"),
            ),
        }
    }
}

impl From<domain::DomainError> for ApiError {
    fn from(error: domain::DomainError) -> Self {
        ApplicationError::from(error).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
