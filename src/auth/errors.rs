//! Authentication error taxonomy
//! Mission: One variant per way a caller can fail to get through the gate

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Auth error types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    NoToken,
    InvalidToken,
    ExpiredToken,
    RevokedToken,
    NotAuthenticated,
    InsufficientPermission,
    /// Unknown email and wrong password share this variant.
    InvalidCredentials,
    AccountNotActive,
    /// Unexpected failure while verifying a request.
    Authentication,
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::InsufficientPermission => StatusCode::FORBIDDEN,
            AuthError::Authentication => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            AuthError::NoToken => "No token provided",
            AuthError::InvalidToken => "Invalid token",
            AuthError::ExpiredToken => "Token expired",
            AuthError::RevokedToken => "Token has been revoked",
            AuthError::NotAuthenticated => "Not authenticated",
            AuthError::InsufficientPermission => "Insufficient permissions",
            AuthError::InvalidCredentials => "Invalid credentials",
            AuthError::AccountNotActive => "Account is not active",
            AuthError::Authentication => "Authentication error",
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for AuthError {}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.message() }))).into_response()
    }
}
