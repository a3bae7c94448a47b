//! Session Lifecycle
//! Mission: Register, log in, refresh and log out users
//!
//! Login issues a session/refresh token pair and warms `user:<id>`. Logout
//! and administrative revocation write `blacklist:<token>` for the token's
//! remaining lifetime.

use crate::{
    auth::{
        errors::AuthError,
        jwt::{JwtHandler, TokenError},
        models::{
            LoginRequest, LoginResponse, RegisterRequest, Role, SessionToken, User, UserStatus,
            UserUpdate,
        },
        revocation::{remaining_lifetime, RevocationList},
        user_store::{NewUser, UserChanges, UserStore},
    },
    config::{BootstrapAdmin, RevocationFailPolicy},
    error::ApiError,
};
use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

/// Session operations shared by the auth routes
#[derive(Clone)]
pub struct SessionService {
    users: UserStore,
    jwt: Arc<JwtHandler>,
    revocations: RevocationList,
    fail_policy: RevocationFailPolicy,
    bcrypt_cost: u32,
}

impl SessionService {
    pub fn new(
        users: UserStore,
        jwt: Arc<JwtHandler>,
        revocations: RevocationList,
        fail_policy: RevocationFailPolicy,
        bcrypt_cost: u32,
    ) -> Self {
        Self {
            users,
            jwt,
            revocations,
            fail_policy,
            bcrypt_cost,
        }
    }

    /// Create an active account. Duplicate email → 409.
    pub async fn register(&self, req: RegisterRequest) -> Result<User, ApiError> {
        if self.users.find_credentials_by_email(&req.email).await?.is_some() {
            return Err(email_taken());
        }

        let password_hash = self.hash_password(req.password).await?;
        let created = self
            .users
            .create(NewUser {
                email: req.email,
                password_hash,
                first_name: req.first_name,
                last_name: req.last_name,
                role: req.role,
                organization: req.organization,
                phone: req.phone,
            })
            .await?;

        // A concurrent registration can still win the unique index.
        created.ok_or_else(email_taken)
    }

    pub async fn login(&self, req: LoginRequest) -> Result<LoginResponse, ApiError> {
        let Some(credentials) = self.users.find_credentials_by_email(&req.email).await? else {
            warn!("Login failed: unknown email");
            return Err(AuthError::InvalidCredentials.into());
        };

        if credentials.user.status != UserStatus::Active {
            warn!(user_id = %credentials.user.id, "Login refused: account not active");
            return Err(AuthError::AccountNotActive.into());
        }

        if !self
            .verify_password(req.password, credentials.password_hash)
            .await?
        {
            warn!(user_id = %credentials.user.id, "Login failed: wrong password");
            return Err(AuthError::InvalidCredentials.into());
        }

        let user = credentials.user;
        if let Err(e) = self.users.touch_last_login(&user.id).await {
            warn!("Failed to record last login for {}: {:#}", user.id, e);
        }

        let token = self.jwt.issue_session_token(&user.identity())?;
        let refresh_token = self.jwt.issue_refresh_token(&user.id)?;
        self.users.warm(&user).await;

        info!("User logged in: {} ({})", user.email, user.role.as_str());

        Ok(LoginResponse {
            message: "Login successful",
            user,
            token,
            refresh_token,
        })
    }

    /// Exchange a refresh token for a new session token carrying current claims
    pub async fn refresh(&self, refresh_token: &str) -> Result<String, ApiError> {
        self.revocations
            .ensure_not_revoked(refresh_token, self.fail_policy)
            .await?;

        let (user_id, _expires_at) = self
            .jwt
            .verify_refresh_token(refresh_token)
            .map_err(AuthError::from)?;

        let user = self
            .users
            .get(&user_id)
            .await?
            .ok_or(AuthError::InvalidToken)?;
        if user.status != UserStatus::Active {
            return Err(AuthError::AccountNotActive.into());
        }

        Ok(self.jwt.issue_session_token(&user.identity())?)
    }

    /// Revoke the token that authenticated this request, and the caller's
    /// refresh token when one is handed in.
    pub async fn logout(
        &self,
        user_id: &str,
        session: &SessionToken,
        refresh_token: Option<&str>,
    ) -> Result<(), ApiError> {
        let now = Utc::now().timestamp();

        // Checked before anything is written so a bad body revokes nothing
        let refresh = match refresh_token {
            Some(raw) => match self.jwt.verify_refresh_token(raw) {
                Ok((subject, _)) if subject != user_id => {
                    return Err(ApiError::BadRequest("Invalid refresh token".to_string()))
                }
                Ok((_, expires_at)) => Some((raw, expires_at)),
                Err(TokenError::Expired) => None,
                Err(TokenError::Invalid) => {
                    return Err(ApiError::BadRequest("Invalid refresh token".to_string()))
                }
            },
            None => None,
        };

        self.revocations
            .revoke(&session.raw, remaining_lifetime(session.expires_at, now))
            .await
            .context("Failed to revoke session token")?;

        if let Some((raw, expires_at)) = refresh {
            self.revocations
                .revoke(raw, remaining_lifetime(expires_at, now))
                .await
                .context("Failed to revoke refresh token")?;
        }
        Ok(())
    }

    /// Revoke any well-signed session or refresh token. Returns `false` when
    /// it had already expired.
    pub async fn revoke_token(&self, token: &str) -> Result<bool, ApiError> {
        let expires_at = self
            .jwt
            .session_expiry(token)
            .or_else(|_| self.jwt.refresh_expiry(token))
            .map_err(|_| ApiError::BadRequest("Invalid token".to_string()))?;

        let now = Utc::now().timestamp();
        if now >= expires_at {
            return Ok(false);
        }

        self.revocations
            .revoke(token, remaining_lifetime(expires_at, now))
            .await
            .context("Failed to revoke token")?;
        Ok(true)
    }

    /// Apply a profile update. An empty update is rejected.
    pub async fn update_profile(&self, user_id: &str, update: UserUpdate) -> Result<User, ApiError> {
        if update.is_empty() {
            return Err(ApiError::BadRequest("No valid fields to update".to_string()));
        }

        let password_hash = match update.password {
            Some(password) => Some(self.hash_password(password).await?),
            None => None,
        };

        self.users
            .update(
                user_id,
                UserChanges {
                    first_name: update.first_name,
                    last_name: update.last_name,
                    organization: update.organization,
                    phone: update.phone,
                    password_hash,
                },
            )
            .await?
            .ok_or(ApiError::NotFound("User not found"))
    }

    /// Create the configured admin account if its email is not registered yet
    pub async fn bootstrap_admin(&self, admin: &BootstrapAdmin) -> Result<bool> {
        if self
            .users
            .find_credentials_by_email(&admin.email)
            .await?
            .is_some()
        {
            return Ok(false);
        }

        let password_hash = self.hash_password(admin.password.clone()).await?;
        let created = self
            .users
            .create(NewUser {
                email: admin.email.clone(),
                password_hash,
                first_name: "System".to_string(),
                last_name: "Administrator".to_string(),
                role: Role::Admin,
                organization: None,
                phone: None,
            })
            .await?;

        if created.is_some() {
            info!("Bootstrap admin created: {}", admin.email);
        }
        Ok(created.is_some())
    }

    async fn hash_password(&self, password: String) -> Result<String> {
        let cost = self.bcrypt_cost;
        tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .map_err(|e| anyhow!("password hashing task failed: {e}"))?
            .context("Failed to hash password")
    }

    async fn verify_password(&self, password: String, hash: String) -> Result<bool> {
        tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
            .await
            .map_err(|e| anyhow!("password verification task failed: {e}"))?
            .context("Failed to verify password")
    }
}

fn email_taken() -> ApiError {
    ApiError::Conflict("User with this email already exists".to_string())
}
