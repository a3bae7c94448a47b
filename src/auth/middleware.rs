//! Authentication Middleware
//! Mission: Gate protected routes on a present, unrevoked, valid bearer token,
//! then on role membership

use crate::{
    auth::{
        errors::AuthError,
        jwt::JwtHandler,
        models::{Identity, Role, SessionToken},
        revocation::RevocationList,
    },
    config::RevocationFailPolicy,
};
use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// What the auth middleware needs per request
#[derive(Clone)]
pub struct AuthState {
    pub jwt: Arc<JwtHandler>,
    pub revocations: RevocationList,
    pub fail_policy: RevocationFailPolicy,
}

/// Pull the token out of `Authorization: Bearer <token>`
pub fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
}

/// Auth middleware: header → revocation check → signature and expiry
pub async fn authenticate(
    State(auth): State<AuthState>,
    req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let (mut parts, body) = req.into_parts();

    let token = bearer_token(&parts)
        .ok_or(AuthError::NoToken)?
        .to_string();

    // Revocation first: a revoked token is refused even while its signature is still good.
    auth.revocations
        .ensure_not_revoked(&token, auth.fail_policy)
        .await?;

    let verified = auth.jwt.verify_session_token(&token).map_err(AuthError::from)?;

    debug!(
        user_id = %verified.identity.id,
        role = verified.identity.role.as_str(),
        "Request authenticated"
    );

    parts.extensions.insert(SessionToken {
        raw: token,
        expires_at: verified.expires_at,
    });
    parts.extensions.insert(verified.identity);

    Ok(next.run(Request::from_parts(parts, body)).await)
}

/// Roles allowed through an authorization gate, fixed at route registration
#[derive(Debug, Clone)]
pub struct AllowedRoles(Arc<[Role]>);

impl AllowedRoles {
    pub fn new(roles: impl IntoIterator<Item = Role>) -> Self {
        Self(roles.into_iter().collect())
    }

    pub fn permits(&self, role: Role) -> bool {
        self.0.contains(&role)
    }
}

/// Authorization gate. Must run after [`authenticate`].
pub async fn authorize(
    State(allowed): State<AllowedRoles>,
    req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let identity = req
        .extensions()
        .get::<Identity>()
        .ok_or(AuthError::NotAuthenticated)?;

    if !allowed.permits(identity.role) {
        warn!(
            user_id = %identity.id,
            role = identity.role.as_str(),
            "Insufficient permissions"
        );
        return Err(AuthError::InsufficientPermission);
    }

    Ok(next.run(req).await)
}

/// The authenticated caller
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Identity);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .map(CurrentUser)
            .ok_or(AuthError::NotAuthenticated)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for SessionToken
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionToken>()
            .cloned()
            .ok_or(AuthError::NotAuthenticated)
    }
}
