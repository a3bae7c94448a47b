//! Request validation
//! Mission: Reject malformed input at the HTTP boundary with a 400

use crate::error::ApiError;
use axum::extract::{FromRequest, FromRequestParts};
use regex::Regex;

lazy_static::lazy_static! {
    static ref EMAIL_REGEX: Regex =
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap();
    static ref UUID_REGEX: Regex =
        Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
            .unwrap();
    static ref CURRENCY_REGEX: Regex = Regex::new(r"^[A-Z]{3}$").unwrap();
}

const MAX_EMAIL_LENGTH: usize = 254;
pub const MIN_PASSWORD_LENGTH: usize = 8;
// bcrypt ignores everything past 72 bytes
const MAX_PASSWORD_LENGTH: usize = 72;

/// JSON body extractor whose rejection is an [`ApiError`] (400, JSON body)
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// Query string extractor whose rejection is an [`ApiError`]
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

/// Field-level checks for a request body
pub trait Validate {
    fn validate(&self) -> Result<(), ApiError>;
}

pub fn email(value: &str) -> Result<(), ApiError> {
    if value.len() > MAX_EMAIL_LENGTH || !EMAIL_REGEX.is_match(value) {
        return Err(ApiError::validation("Invalid email address"));
    }
    Ok(())
}

pub fn password(value: &str) -> Result<(), ApiError> {
    if value.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ApiError::validation(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    if value.len() > MAX_PASSWORD_LENGTH {
        return Err(ApiError::validation(format!(
            "Password must be at most {MAX_PASSWORD_LENGTH} bytes"
        )));
    }
    Ok(())
}

/// Character count within `min..=max`
pub fn length(field: &str, value: &str, min: usize, max: usize) -> Result<(), ApiError> {
    let count = value.trim().chars().count();
    if count < min || count > max {
        return Err(ApiError::validation(format!(
            "{field} must be between {min} and {max} characters"
        )));
    }
    Ok(())
}

pub fn max_length(field: &str, value: Option<&str>, max: usize) -> Result<(), ApiError> {
    match value {
        Some(v) if v.chars().count() > max => Err(ApiError::validation(format!(
            "{field} must be at most {max} characters"
        ))),
        _ => Ok(()),
    }
}

pub fn uuid(field: &str, value: &str) -> Result<(), ApiError> {
    if !UUID_REGEX.is_match(value) {
        return Err(ApiError::validation(format!("{field} must be a valid UUID")));
    }
    Ok(())
}

pub fn currency(value: &str) -> Result<(), ApiError> {
    if !CURRENCY_REGEX.is_match(value) {
        return Err(ApiError::validation("currency must be a 3-letter ISO code"));
    }
    Ok(())
}
