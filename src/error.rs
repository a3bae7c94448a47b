//! API error boundary
//! Mission: Map every failure to a status code and a short JSON message

use crate::auth::errors::AuthError;
use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

/// Internal error text attached to 500 responses.
///
/// Never rendered by default; `middleware::errors::expose_internal_errors`
/// copies it into the body in development mode.
#[derive(Debug, Clone)]
pub struct InternalErrorDetail(pub String);

/// Errors returned by route handlers
#[derive(Debug)]
pub enum ApiError {
    Auth(AuthError),
    Validation(String),
    NotFound(&'static str),
    Conflict(String),
    BadRequest(String),
    Internal(anyhow::Error),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Auth(e) => e.status(),
            ApiError::Validation(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        ApiError::Auth(e)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::Internal(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Auth(e) => write!(f, "{e}"),
            ApiError::Validation(m) | ApiError::Conflict(m) | ApiError::BadRequest(m) => {
                write!(f, "{m}")
            }
            ApiError::NotFound(m) => write!(f, "{m}"),
            ApiError::Internal(e) => write!(f, "{e:#}"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            ApiError::Auth(e) => e.into_response(),
            ApiError::Internal(e) => {
                error!("Internal error: {:#}", e);
                let mut response =
                    (status, Json(json!({ "error": "Internal server error" }))).into_response();
                response
                    .extensions_mut()
                    .insert(InternalErrorDetail(format!("{e:#}")));
                response
            }
            other => (status, Json(json!({ "error": other.to_string() }))).into_response(),
        }
    }
}
