//! JWT Token Handler
//! Mission: Issue and verify session and refresh tokens with one shared secret

use crate::auth::{
    errors::AuthError,
    models::{Identity, RefreshClaims, RefreshMarker, SessionClaims},
};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Why a presented token was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    /// Well-signed, but `now >= exp`.
    Expired,
    /// Bad signature, wrong shape or wrong token kind.
    Invalid,
}

impl std::fmt::Display for TokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenError::Expired => write!(f, "Token expired"),
            TokenError::Invalid => write!(f, "Invalid token"),
        }
    }
}

impl std::error::Error for TokenError {}

impl From<TokenError> for AuthError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Expired => AuthError::ExpiredToken,
            TokenError::Invalid => AuthError::InvalidToken,
        }
    }
}

/// A verified session token
#[derive(Debug, Clone)]
pub struct VerifiedSession {
    pub identity: Identity,
    pub issued_at: i64,
    pub expires_at: i64,
}

/// JWT Handler for token operations
pub struct JwtHandler {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    session_ttl: Duration,
    refresh_ttl: Duration,
}

impl JwtHandler {
    /// Create a new JWT handler with secret key and token lifetimes
    pub fn new(secret: &str, session_ttl: Duration, refresh_ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked by hand so the boundary is exact and the clock injectable.
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            session_ttl,
            refresh_ttl,
        }
    }

    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    /// Issue a session token for an identity
    pub fn issue_session_token(&self, identity: &Identity) -> Result<String> {
        self.issue_session_token_at(identity, Utc::now())
    }

    pub fn issue_session_token_at(&self, identity: &Identity, now: DateTime<Utc>) -> Result<String> {
        let (iat, exp) = window(now, self.session_ttl)?;

        let claims = SessionClaims {
            sub: identity.id.clone(),
            email: identity.email.clone(),
            role: identity.role,
            iat,
            exp,
            jti: Uuid::new_v4().to_string(),
        };

        debug!(
            "Issuing session token for {} ({}), expires at {}",
            identity.email, identity.id, exp
        );

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .context("Failed to sign session token")
    }

    /// Issue a refresh token for a user id
    pub fn issue_refresh_token(&self, user_id: &str) -> Result<String> {
        self.issue_refresh_token_at(user_id, Utc::now())
    }

    pub fn issue_refresh_token_at(&self, user_id: &str, now: DateTime<Utc>) -> Result<String> {
        let (iat, exp) = window(now, self.refresh_ttl)?;

        let claims = RefreshClaims {
            sub: user_id.to_string(),
            iat,
            exp,
            jti: Uuid::new_v4().to_string(),
            typ: RefreshMarker::Refresh,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .context("Failed to sign refresh token")
    }

    /// Verify a session token against the current time
    pub fn verify_session_token(&self, token: &str) -> Result<VerifiedSession, TokenError> {
        self.verify_session_token_at(token, Utc::now())
    }

    pub fn verify_session_token_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<VerifiedSession, TokenError> {
        let claims = decode::<SessionClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| {
                debug!("Session token rejected: {}", e);
                TokenError::Invalid
            })?
            .claims;

        if now.timestamp() >= claims.exp {
            return Err(TokenError::Expired);
        }

        Ok(VerifiedSession {
            identity: Identity {
                id: claims.sub,
                email: claims.email,
                role: claims.role,
            },
            issued_at: claims.iat,
            expires_at: claims.exp,
        })
    }

    /// Verify a refresh token, returning `(user_id, expires_at)`
    pub fn verify_refresh_token(&self, token: &str) -> Result<(String, i64), TokenError> {
        self.verify_refresh_token_at(token, Utc::now())
    }

    pub fn verify_refresh_token_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<(String, i64), TokenError> {
        let claims = decode::<RefreshClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|_| TokenError::Invalid)?
            .claims;

        if now.timestamp() >= claims.exp {
            return Err(TokenError::Expired);
        }

        Ok((claims.sub, claims.exp))
    }

    /// Read `exp` from a correctly signed session token, expired or not.
    pub fn session_expiry(&self, token: &str) -> Result<i64, TokenError> {
        decode::<SessionClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims.exp)
            .map_err(|_| TokenError::Invalid)
    }

    /// Read `exp` from a correctly signed refresh token, expired or not.
    pub fn refresh_expiry(&self, token: &str) -> Result<i64, TokenError> {
        decode::<RefreshClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims.exp)
            .map_err(|_| TokenError::Invalid)
    }
}

fn window(now: DateTime<Utc>, ttl: Duration) -> Result<(i64, i64)> {
    let ttl = chrono::Duration::from_std(ttl).context("Token ttl out of range")?;
    let exp = now.checked_add_signed(ttl).context("Invalid timestamp")?;
    Ok((now.timestamp(), exp.timestamp()))
}
