//! Authentication API Endpoints
//! Mission: Provide session and user management endpoints

use crate::{
    app::AppState,
    auth::{
        middleware::{authenticate, authorize, AllowedRoles, CurrentUser},
        models::{
            LoginRequest, LoginResponse, LogoutRequest, RefreshRequest, RegisterRequest,
            RevokeRequest, Role, SessionToken, UserFilters, UserUpdate,
        },
    },
    error::ApiError,
    validation::{ApiJson, ApiQuery, Validate},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tracing::info;

/// Auth and user administration routes, relative to the API root
pub fn routes(state: &AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh));

    let authenticated = Router::new()
        .route("/auth/me", get(get_current_user).put(update_current_user))
        .route("/auth/logout", post(logout));

    let admin = Router::new()
        .route("/auth/revoke", post(revoke_token))
        .route("/users", get(list_users))
        .route("/users/:id", get(get_user).delete(deactivate_user))
        .route_layer(from_fn_with_state(AllowedRoles::new([Role::Admin]), authorize));

    public.merge(
        authenticated
            .merge(admin)
            .route_layer(from_fn_with_state(state.auth.clone(), authenticate)),
    )
}

/// POST /auth/register
pub async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;
    let user = state.sessions.register(req).await?;

    info!("User registered: {} ({})", user.email, user.role.as_str());

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "User created successfully", "user": user })),
    ))
}

/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    req.validate()?;
    Ok(Json(state.sessions.login(req).await?))
}

/// POST /auth/refresh
pub async fn refresh(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RefreshRequest>,
) -> Result<Json<Value>, ApiError> {
    let token = state.sessions.refresh(&req.refresh_token).await?;
    Ok(Json(json!({ "token": token })))
}

/// GET /auth/me
pub async fn get_current_user(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
) -> Result<Json<Value>, ApiError> {
    let user = state
        .users
        .get(&identity.id)
        .await?
        .ok_or(ApiError::NotFound("User not found"))?;
    Ok(Json(json!({ "user": user })))
}

/// PUT /auth/me
pub async fn update_current_user(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    ApiJson(update): ApiJson<UserUpdate>,
) -> Result<Json<Value>, ApiError> {
    update.validate()?;
    let user = state.sessions.update_profile(&identity.id, update).await?;
    Ok(Json(json!({ "message": "Profile updated successfully", "user": user })))
}

/// POST /auth/logout
pub async fn logout(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    session: SessionToken,
    body: Option<ApiJson<LogoutRequest>>,
) -> Result<Json<Value>, ApiError> {
    let refresh_token = body.and_then(|ApiJson(req)| req.refresh_token);
    state
        .sessions
        .logout(&identity.id, &session, refresh_token.as_deref())
        .await?;
    info!("User logged out: {}", identity.email);
    Ok(Json(json!({ "message": "Logged out successfully" })))
}

/// POST /auth/revoke (admin)
pub async fn revoke_token(
    State(state): State<AppState>,
    CurrentUser(admin): CurrentUser,
    ApiJson(req): ApiJson<RevokeRequest>,
) -> Result<Json<Value>, ApiError> {
    let revoked = state.sessions.revoke_token(&req.token).await?;
    let message = if revoked {
        info!("Token revoked by admin {}", admin.email);
        "Token revoked"
    } else {
        "Token already expired"
    };
    Ok(Json(json!({ "message": message })))
}

/// GET /users (admin)
pub async fn list_users(
    State(state): State<AppState>,
    ApiQuery(filters): ApiQuery<UserFilters>,
) -> Result<Json<Value>, ApiError> {
    let users = state.users.list(filters).await?;
    Ok(Json(json!({ "count": users.len(), "users": users })))
}

/// GET /users/:id (admin)
pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let user = state
        .users
        .get(&user_id)
        .await?
        .ok_or(ApiError::NotFound("User not found"))?;
    Ok(Json(json!({ "user": user })))
}

/// DELETE /users/:id (admin). Deactivates; rows are never removed.
pub async fn deactivate_user(
    State(state): State<AppState>,
    CurrentUser(admin): CurrentUser,
    Path(user_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if user_id == admin.id {
        return Err(ApiError::BadRequest(
            "Cannot deactivate your own account".to_string(),
        ));
    }

    if !state.users.deactivate(&user_id).await? {
        return Err(ApiError::NotFound("User not found"));
    }

    info!("User {} deactivated by {}", user_id, admin.email);
    Ok(Json(json!({ "message": "User deactivated successfully" })))
}
