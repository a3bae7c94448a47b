//! Development-mode error detail.

use crate::error::InternalErrorDetail;
use axum::{
    extract::Request,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Adds the internal error text to 500 bodies. Only installed in development.
pub async fn expose_internal_errors(request: Request, next: Next) -> Response {
    let response = next.run(request).await;

    let Some(InternalErrorDetail(detail)) = response.extensions().get::<InternalErrorDetail>().cloned()
    else {
        return response;
    };

    let status = response.status();
    (
        status,
        Json(json!({ "error": "Internal server error", "message": detail })),
    )
        .into_response()
}
