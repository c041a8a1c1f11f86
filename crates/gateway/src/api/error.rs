//! API error taxonomy and the uniform response envelope.
//!
//! Every response is `{code, success, ...}`: successes carry `data`,
//! failures carry `error`.  `code` duplicates the HTTP status so clients
//! reading only the body still see it.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;

use crate::runtime::LifecycleError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("no session")]
    NoSession,
    #[error("already connected")]
    AlreadyConnected,
    #[error("not logged in")]
    NotLoggedIn,
    #[error("not connected")]
    NotConnected,
    #[error("already logged in")]
    AlreadyLoggedIn,
    #[error("timeout waiting for connection")]
    ConnectTimeout,
    #[error("{0}")]
    BadPayload(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("upstream failure: {0}")]
    Upstream(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NoSession | ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::AlreadyConnected | ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::NotLoggedIn | ApiError::NotConnected | ApiError::AlreadyLoggedIn => {
                StatusCode::PRECONDITION_FAILED
            }
            ApiError::ConnectTimeout => StatusCode::GATEWAY_TIMEOUT,
            ApiError::BadPayload(_) => StatusCode::BAD_REQUEST,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = serde_json::json!({
            "code": status.as_u16(),
            "success": false,
            "error": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

impl From<LifecycleError> for ApiError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::AlreadyConnected => ApiError::AlreadyConnected,
            LifecycleError::NoSession => ApiError::NoSession,
            LifecycleError::NotLoggedIn => ApiError::NotLoggedIn,
            LifecycleError::NotConnected => ApiError::NotConnected,
            LifecycleError::AlreadyLoggedIn => ApiError::AlreadyLoggedIn,
            LifecycleError::ConnectTimeout => ApiError::ConnectTimeout,
            LifecycleError::Upstream(msg) => ApiError::Upstream(msg),
            LifecycleError::Store(msg) => ApiError::Internal(msg),
        }
    }
}

/// Build the success envelope: `{code: 200, success: true, data}`.
pub fn ok<T: Serialize>(data: T) -> Response {
    let body = serde_json::json!({
        "code": 200,
        "success": true,
        "data": data,
    });
    (StatusCode::OK, Json(body)).into_response()
}
