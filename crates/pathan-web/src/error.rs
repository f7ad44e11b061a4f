//! HTTP错误响应

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use pathan_core::PathanError;
use pathan_records::RecordStoreError;
use serde_json::json;
use tracing::error;

/// Web层错误
#[derive(Debug)]
pub enum ApiError {
    Core(PathanError),
    /// 已登录但无权限
    Forbidden(String),
}

impl From<PathanError> for ApiError {
    fn from(e: PathanError) -> Self {
        ApiError::Core(e)
    }
}

impl From<RecordStoreError> for ApiError {
    fn from(e: RecordStoreError) -> Self {
        ApiError::Core(e.into())
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl ApiError {
    fn parts(self) -> (StatusCode, &'static str, String) {
        let err = match self {
            ApiError::Forbidden(msg) => return (StatusCode::FORBIDDEN, "forbidden", msg),
            ApiError::Core(err) => err,
        };
        let message = err.to_string();
        let (status, kind) = match err {
            PathanError::Validation(_) | PathanError::Serialization(_) => {
                (StatusCode::BAD_REQUEST, "validation")
            }
            PathanError::Authentication(_) => (StatusCode::UNAUTHORIZED, "authentication"),
            PathanError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            PathanError::InvalidStateTransition { .. } => (StatusCode::CONFLICT, "invalid_state"),
            PathanError::ModelUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "model_unavailable"),
            PathanError::Generation(_) => (StatusCode::BAD_GATEWAY, "generation"),
            PathanError::RecordStore(_) => (StatusCode::BAD_GATEWAY, "record_store"),
            PathanError::Report(_) => (StatusCode::INTERNAL_SERVER_ERROR, "report"),
            PathanError::Config(_) | PathanError::Internal(_) | PathanError::Io(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
        };
        (status, kind, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = self.parts();
        if status.is_server_error() {
            error!("Request failed with {}: {}", status, message);
        }

        let body = Json(json!({
            "error": kind,
            "message": message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}
