//! User Storage
//! Mission: Persist user accounts in SQLite behind a cache-aside snapshot layer
//!
//! Reads by id go cache-then-store. Every write goes store-then-invalidate,
//! so callers never have to remember to drop `user:<id>` themselves.

use crate::{
    auth::models::{Role, User, UserCredentials, UserFilters, UserStatus},
    cache::{CacheClient, EntityCache},
    db::{conversion_error, Database},
};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

const USER_COLUMNS: &str = "id, email, first_name, last_name, role, organization, phone, \
                            status, kyc_verified, created_at";

/// Fields for a new account. The password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub organization: Option<String>,
    pub phone: Option<String>,
}

/// Column changes for a profile update. `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub organization: Option<String>,
    pub phone: Option<String>,
    pub password_hash: Option<String>,
}

/// User repository
#[derive(Clone)]
pub struct UserStore {
    db: Database,
    snapshots: EntityCache<User>,
}

impl UserStore {
    pub fn new(db: Database, cache: CacheClient, snapshot_ttl: Duration) -> Self {
        Self {
            db,
            snapshots: EntityCache::new(cache, "user", snapshot_ttl),
        }
    }

    /// Cache key for a user snapshot
    pub fn cache_key(&self, user_id: &str) -> String {
        self.snapshots.key(user_id)
    }

    /// Get user by id, serving from the snapshot cache when possible
    pub async fn get(&self, user_id: &str) -> Result<Option<User>> {
        let id = user_id.to_string();
        let db = self.db.clone();
        self.snapshots
            .load(user_id, move || async move {
                db.call(move |conn| {
                    conn.query_row(
                        &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                        params![id],
                        user_from_row,
                    )
                    .optional()
                    .context("Failed to load user")
                })
                .await
            })
            .await
    }

    /// Get user and password hash by exact email match. Never cached.
    pub async fn find_credentials_by_email(&self, email: &str) -> Result<Option<UserCredentials>> {
        let email = email.to_string();
        self.db
            .call(move |conn| {
                conn.query_row(
                    &format!("SELECT {USER_COLUMNS}, password_hash FROM users WHERE email = ?1"),
                    params![email],
                    |row| {
                        Ok(UserCredentials {
                            user: user_from_row(row)?,
                            password_hash: row.get(10)?,
                        })
                    },
                )
                .optional()
                .context("Failed to look up user by email")
            })
            .await
    }

    /// Create a new user. Returns `None` when the email is already registered.
    pub async fn create(&self, new_user: NewUser) -> Result<Option<User>> {
        let user = User {
            id: Uuid::new_v4().to_string(),
            email: new_user.email,
            first_name: new_user.first_name,
            last_name: new_user.last_name,
            role: new_user.role,
            organization: new_user.organization,
            phone: new_user.phone,
            status: UserStatus::Active,
            kyc_verified: false,
            created_at: Utc::now(),
        };
        let password_hash = new_user.password_hash;

        let inserted = self
            .db
            .call({
                let user = user.clone();
                move |conn| {
                    let changes = conn
                        .execute(
                            "INSERT OR IGNORE INTO users (id, email, password_hash, first_name, last_name,
                                role, organization, phone, status, kyc_verified, created_at)
                             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, ?10)",
                            params![
                                user.id,
                                user.email,
                                password_hash,
                                user.first_name,
                                user.last_name,
                                user.role.as_str(),
                                user.organization,
                                user.phone,
                                user.status.as_str(),
                                user.created_at,
                            ],
                        )
                        .context("Failed to insert user")?;
                    Ok(changes > 0)
                }
            })
            .await?;

        if !inserted {
            return Ok(None);
        }

        info!("Created user: {} ({})", user.email, user.role.as_str());
        Ok(Some(user))
    }

    /// Apply a partial update. Returns `None` if no such user exists.
    pub async fn update(&self, user_id: &str, changes: UserChanges) -> Result<Option<User>> {
        let id = user_id.to_string();
        let updated = self
            .db
            .call(move |conn| {
                let rows = conn
                    .execute(
                        "UPDATE users SET
                            first_name = COALESCE(?1, first_name),
                            last_name = COALESCE(?2, last_name),
                            organization = COALESCE(?3, organization),
                            phone = COALESCE(?4, phone),
                            password_hash = COALESCE(?5, password_hash)
                         WHERE id = ?6",
                        params![
                            changes.first_name,
                            changes.last_name,
                            changes.organization,
                            changes.phone,
                            changes.password_hash,
                            id,
                        ],
                    )
                    .context("Failed to update user")?;

                if rows == 0 {
                    return Ok(None);
                }

                conn.query_row(
                    &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                    params![id],
                    user_from_row,
                )
                .optional()
                .context("Failed to reload user")
            })
            .await?;

        self.snapshots.invalidate(user_id).await;
        Ok(updated)
    }

    /// Mark a user inactive. Returns `false` if no such user exists.
    pub async fn deactivate(&self, user_id: &str) -> Result<bool> {
        let id = user_id.to_string();
        let found = self
            .db
            .call(move |conn| {
                let rows = conn
                    .execute(
                        "UPDATE users SET status = ?1 WHERE id = ?2",
                        params![UserStatus::Inactive.as_str(), id],
                    )
                    .context("Failed to deactivate user")?;
                Ok(rows > 0)
            })
            .await?;

        self.snapshots.invalidate(user_id).await;
        if found {
            info!("Deactivated user: {}", user_id);
        }
        Ok(found)
    }

    /// Record a successful login
    pub async fn touch_last_login(&self, user_id: &str) -> Result<()> {
        let id = user_id.to_string();
        self.db
            .call(move |conn| {
                conn.execute(
                    "UPDATE users SET last_login = ?1 WHERE id = ?2",
                    params![Utc::now(), id],
                )
                .context("Failed to record last login")?;
                Ok(())
            })
            .await
    }

    /// Seed the snapshot cache with a freshly loaded user
    pub async fn warm(&self, user: &User) {
        self.snapshots.put(&user.id, user).await;
    }

    /// List users, newest first
    pub async fn list(&self, filters: UserFilters) -> Result<Vec<User>> {
        self.db
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {USER_COLUMNS} FROM users
                     WHERE (?1 IS NULL OR role = ?1) AND (?2 IS NULL OR status = ?2)
                     ORDER BY created_at DESC"
                ))?;

                let users = stmt
                    .query_map(
                        params![
                            filters.role.map(|r| r.as_str()),
                            filters.status.map(|s| s.as_str()),
                        ],
                        user_from_row,
                    )?
                    .collect::<Result<Vec<_>, _>>()
                    .context("Failed to list users")?;

                Ok(users)
            })
            .await
    }
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    let role: String = row.get(4)?;
    let status: String = row.get(7)?;
    let created_at: DateTime<Utc> = row.get(9)?;

    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        role: role.parse().map_err(|e| conversion_error(4, e))?,
        organization: row.get(5)?,
        phone: row.get(6)?,
        status: status.parse().map_err(|e| conversion_error(7, e))?,
        kyc_verified: row.get(8)?,
        created_at,
    })
}
