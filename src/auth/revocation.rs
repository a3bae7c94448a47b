//! Token revocation list
//! Mission: Reject explicitly revoked tokens until they would have expired anyway

use crate::{auth::errors::AuthError, cache::CacheClient, config::RevocationFailPolicy};
use anyhow::Result;
use std::time::Duration;
use tracing::{error, info, warn};

const KEY_PREFIX: &str = "blacklist:";

/// Revoked tokens, stored as `blacklist:<token>` cache keys
#[derive(Clone)]
pub struct RevocationList {
    cache: CacheClient,
}

impl RevocationList {
    pub fn new(cache: CacheClient) -> Self {
        Self { cache }
    }

    pub fn key(token: &str) -> String {
        format!("{KEY_PREFIX}{token}")
    }

    /// Revoke `token` for `remaining` (at least one second). Idempotent.
    pub async fn revoke(&self, token: &str, remaining: Duration) -> Result<()> {
        let ttl = remaining.max(Duration::from_secs(1));
        self.cache
            .set_strict(&Self::key(token), "1", Some(ttl))
            .await?;
        info!("Token revoked for {}s", ttl.as_secs());
        Ok(())
    }

    /// Whether `token` has been revoked. Cache failures are returned, not hidden.
    pub async fn is_revoked(&self, token: &str) -> Result<bool> {
        self.cache.exists_strict(&Self::key(token)).await
    }

    /// Reject a revoked token. A failed lookup is handled per `policy`.
    pub async fn ensure_not_revoked(
        &self,
        token: &str,
        policy: RevocationFailPolicy,
    ) -> Result<(), AuthError> {
        match self.is_revoked(token).await {
            Ok(true) => Err(AuthError::RevokedToken),
            Ok(false) => Ok(()),
            Err(e) => match policy {
                RevocationFailPolicy::Open => {
                    warn!("Revocation lookup failed, treating token as not revoked: {:#}", e);
                    Ok(())
                }
                RevocationFailPolicy::Closed => {
                    error!("Revocation lookup failed, rejecting token: {:#}", e);
                    Err(AuthError::Authentication)
                }
            },
        }
    }
}

/// Seconds left before `expires_at`, as a ttl for the revocation entry
pub fn remaining_lifetime(expires_at: i64, now: i64) -> Duration {
    Duration::from_secs(expires_at.saturating_sub(now).max(0) as u64)
}
