//! Error envelope the gateway returns for every failure.
//!
//! Each error carries the machine-readable `kind` from the closed
//! taxonomy, a human message and the request id; 503s add a retry hint.
//! Messages come from `CoreError` display implementations, which never
//! embed store fragments or secret values.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use tracing::error;

use crate::error::CoreError;

#[derive(Debug, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    status: StatusCode,
    pub kind: &'static str,
    pub message: String,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

impl ApiError {
    pub fn from_core(err: CoreError, request_id: &str) -> Self {
        let status =
            StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!(request_id, kind = err.kind(), %err, "request failed server-side");
        }
        let retry_after_ms = match &err {
            CoreError::LockAcquireFailed { .. } => Some(250),
            CoreError::StoreUnavailable(_) => Some(1_000),
            _ => None,
        };
        ApiError {
            status,
            kind: err.kind(),
            message: err.to_string(),
            request_id: request_id.to_string(),
            retry_after_ms,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status;
        (status, Json(self)).into_response()
    }
}

/// Handler return type: a status + JSON body, or the error envelope.
pub type ApiResult<T> = Result<(StatusCode, Json<T>), ApiError>;

pub fn ok<T: Serialize>(data: T) -> ApiResult<T> {
    Ok((StatusCode::OK, Json(data)))
}

pub fn created<T: Serialize>(data: T) -> ApiResult<T> {
    Ok((StatusCode::CREATED, Json(data)))
}
