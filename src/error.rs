use crate::auction::LifecycleError;
use crate::bidding::AdmissionError;
use crate::storage::StoreError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// HTTP 계층 공통 오류
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    RuleViolation(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Transient(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "RESOURCE_NOT_FOUND",
            AppError::RuleViolation(_) => "BUSINESS_RULE_VIOLATION",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::Transient(_) => "SERVICE_UNAVAILABLE",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::RuleViolation(_) => StatusCode::CONFLICT,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            // 내부 오류 상세는 로그에만 남김
            AppError::Internal(detail) => {
                error!("{:<12} --> 내부 오류: {}", "Handler", detail);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": self.code(),
            "message": message
        }));

        (status, body).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<AdmissionError> for AppError {
    fn from(err: AdmissionError) -> Self {
        match err {
            AdmissionError::NotFound(_) => AppError::NotFound(err.to_string()),
            AdmissionError::RuleViolation(_) => AppError::RuleViolation(err.to_string()),
            AdmissionError::Transient(_) | AdmissionError::Contention(_) => {
                AppError::Transient(err.to_string())
            }
            AdmissionError::Store(e) => e.into(),
        }
    }
}

impl From<LifecycleError> for AppError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::Invalid(msg) => AppError::BadRequest(msg),
            LifecycleError::RuleViolation(msg) => AppError::RuleViolation(msg),
            LifecycleError::Contention(_) => AppError::Transient(err.to_string()),
            LifecycleError::Store(e) => e.into(),
        }
    }
}
