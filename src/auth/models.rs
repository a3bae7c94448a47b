//! Authentication Models
//! Mission: Define user identity, roles and token claim structures

use crate::{
    error::ApiError,
    validation::{self, Validate},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// User roles for RBAC
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Borrower,
    Lender,
    Arranger,
    Trader,
    Admin,
    Compliance,
}

impl Role {
    pub const ALL: [Role; 6] = [
        Role::Borrower,
        Role::Lender,
        Role::Arranger,
        Role::Trader,
        Role::Admin,
        Role::Compliance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Borrower => "borrower",
            Role::Lender => "lender",
            Role::Arranger => "arranger",
            Role::Trader => "trader",
            Role::Admin => "admin",
            Role::Compliance => "compliance",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| format!("unknown role '{s}'"))
    }
}

/// Account status. Accounts are deactivated, never deleted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    Active,
    Inactive,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Inactive => "inactive",
        }
    }
}

impl FromStr for UserStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(UserStatus::Active),
            "inactive" => Ok(UserStatus::Inactive),
            other => Err(format!("unknown user status '{other}'")),
        }
    }
}

/// User account as exposed to callers and cached under `user:<id>`.
///
/// The password hash lives only in [`UserCredentials`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub organization: Option<String>,
    pub phone: Option<String>,
    pub status: UserStatus,
    pub kyc_verified: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn identity(&self) -> Identity {
        Identity {
            id: self.id.clone(),
            email: self.email.clone(),
            role: self.role,
        }
    }
}

/// A user row together with its bcrypt hash. Never serialized.
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user: User,
    pub password_hash: String,
}

/// Caller identity carried in a session token and attached to requests
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    pub id: String,
    pub email: String,
    pub role: Role,
}

/// The bearer token that authenticated the current request
#[derive(Debug, Clone)]
pub struct SessionToken {
    pub raw: String,
    pub expires_at: i64,
}

/// Session token claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    pub email: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

/// Refresh token claims. No email or role, so they can never go stale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
    pub typ: RefreshMarker,
}

/// Fixed `typ` value that keeps refresh tokens from parsing as session tokens
/// and the other way round.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RefreshMarker {
    Refresh,
}

/// Registration request body
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub organization: Option<String>,
    pub phone: Option<String>,
}

/// Login request body
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Login response
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub message: &'static str,
    pub user: User,
    pub token: String,
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
}

/// Refresh request body
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
}

/// Optional logout body
#[derive(Debug, Default, Deserialize)]
pub struct LogoutRequest {
    #[serde(rename = "refreshToken")]
    pub refresh_token: Option<String>,
}

/// Administrative revoke request body
#[derive(Debug, Deserialize)]
pub struct RevokeRequest {
    pub token: String,
}

/// Partial profile update. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub organization: Option<String>,
    pub phone: Option<String>,
    pub password: Option<String>,
}

impl UserUpdate {
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.organization.is_none()
            && self.phone.is_none()
            && self.password.is_none()
    }
}

impl Validate for RegisterRequest {
    fn validate(&self) -> Result<(), ApiError> {
        validation::email(&self.email)?;
        validation::password(&self.password)?;
        validation::length("first_name", &self.first_name, 2, 100)?;
        validation::length("last_name", &self.last_name, 2, 100)?;
        validation::max_length("organization", self.organization.as_deref(), 255)?;
        validation::max_length("phone", self.phone.as_deref(), 50)
    }
}

impl Validate for LoginRequest {
    fn validate(&self) -> Result<(), ApiError> {
        validation::email(&self.email)?;
        if self.password.is_empty() {
            return Err(ApiError::validation("Password is required"));
        }
        Ok(())
    }
}

impl Validate for UserUpdate {
    fn validate(&self) -> Result<(), ApiError> {
        if let Some(first_name) = &self.first_name {
            validation::length("first_name", first_name, 2, 100)?;
        }
        if let Some(last_name) = &self.last_name {
            validation::length("last_name", last_name, 2, 100)?;
        }
        if let Some(password) = &self.password {
            validation::password(password)?;
        }
        validation::max_length("organization", self.organization.as_deref(), 255)?;
        validation::max_length("phone", self.phone.as_deref(), 50)
    }
}

/// Admin listing filters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserFilters {
    pub role: Option<Role>,
    pub status: Option<UserStatus>,
}
