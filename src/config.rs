//! Application configuration
//! Mission: Resolve every runtime knob from the environment once, at startup

use anyhow::{bail, Context, Result};
use std::time::Duration;

const DEFAULT_SESSION_TTL: &str = "7d";
const DEFAULT_REFRESH_TTL: &str = "30d";
const DEFAULT_BCRYPT_COST: u32 = 12;
const MIN_BCRYPT_COST: u32 = 4;
const MAX_BCRYPT_COST: u32 = 31;

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }

    pub fn is_development(&self) -> bool {
        *self == Environment::Development
    }
}

/// What the auth middleware does when the revocation lookup itself fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevocationFailPolicy {
    /// Treat the token as not revoked and let the request through.
    Open,
    /// Reject the request with an authentication error.
    Closed,
}

impl RevocationFailPolicy {
    fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(RevocationFailPolicy::Open),
            "closed" => Ok(RevocationFailPolicy::Closed),
            other => bail!("REVOCATION_FAIL_POLICY must be 'open' or 'closed', got '{other}'"),
        }
    }
}

/// Credentials for the account created on first start
#[derive(Debug, Clone)]
pub struct BootstrapAdmin {
    pub email: String,
    pub password: String,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub jwt_secret: String,
    pub session_ttl: Duration,
    pub refresh_ttl: Duration,
    pub bcrypt_cost: u32,
    pub cache_ttl: Duration,
    pub store_timeout: Duration,
    pub cache_timeout: Duration,
    pub revocation_fail_policy: RevocationFailPolicy,
    pub cors_origin: String,
    pub rate_limit_window: Duration,
    pub rate_limit_max_requests: u32,
    pub environment: Environment,
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

impl Config {
    /// Load from the process environment (after `.env`, if any).
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let jwt_secret = get("JWT_SECRET").context("JWT_SECRET must be set")?;

        let session_ttl = parse_ttl(
            &get("JWT_EXPIRES_IN").unwrap_or_else(|| DEFAULT_SESSION_TTL.to_string()),
        )
        .context("Invalid JWT_EXPIRES_IN")?;

        let refresh_ttl = parse_ttl(
            &get("JWT_REFRESH_EXPIRES_IN").unwrap_or_else(|| DEFAULT_REFRESH_TTL.to_string()),
        )
        .context("Invalid JWT_REFRESH_EXPIRES_IN")?;

        let bcrypt_cost = match get("BCRYPT_ROUNDS") {
            Some(raw) => raw.trim().parse::<u32>().context("Invalid BCRYPT_ROUNDS")?,
            None => DEFAULT_BCRYPT_COST,
        };
        if !(MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(&bcrypt_cost) {
            bail!(
                "BCRYPT_ROUNDS must be between {} and {}",
                MIN_BCRYPT_COST,
                MAX_BCRYPT_COST
            );
        }

        let port = parse_or(get("PORT"), 5000u16).context("Invalid PORT")?;
        let cache_ttl_secs = parse_or(get("CACHE_TTL_SECS"), 3600u64).context("Invalid CACHE_TTL_SECS")?;
        let store_timeout_ms =
            parse_or(get("STORE_TIMEOUT_MS"), 5000u64).context("Invalid STORE_TIMEOUT_MS")?;
        let cache_timeout_ms =
            parse_or(get("CACHE_TIMEOUT_MS"), 250u64).context("Invalid CACHE_TIMEOUT_MS")?;
        let rate_limit_window_ms = parse_or(get("RATE_LIMIT_WINDOW_MS"), 900_000u64)
            .context("Invalid RATE_LIMIT_WINDOW_MS")?;
        let rate_limit_max_requests = parse_or(get("RATE_LIMIT_MAX_REQUESTS"), 100u32)
            .context("Invalid RATE_LIMIT_MAX_REQUESTS")?;

        let revocation_fail_policy = match get("REVOCATION_FAIL_POLICY") {
            Some(raw) => RevocationFailPolicy::parse(&raw)?,
            None => RevocationFailPolicy::Open,
        };

        let environment = match get("APP_ENV").as_deref().map(str::to_ascii_lowercase) {
            Some(env) if env == "development" || env == "dev" => Environment::Development,
            _ => Environment::Production,
        };

        let bootstrap_admin = match (get("ADMIN_EMAIL"), get("ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some(BootstrapAdmin { email, password }),
            _ => None,
        };

        Ok(Self {
            port,
            database_path: get("DATABASE_PATH").unwrap_or_else(|| "lma_edge.db".to_string()),
            jwt_secret,
            session_ttl,
            refresh_ttl,
            bcrypt_cost,
            cache_ttl: Duration::from_secs(cache_ttl_secs),
            store_timeout: Duration::from_millis(store_timeout_ms),
            cache_timeout: Duration::from_millis(cache_timeout_ms),
            revocation_fail_policy,
            cors_origin: get("CORS_ORIGIN").unwrap_or_else(|| "http://localhost:3000".to_string()),
            rate_limit_window: Duration::from_millis(rate_limit_window_ms),
            rate_limit_max_requests,
            environment,
            bootstrap_admin,
        })
    }
}

fn parse_or<T: std::str::FromStr>(raw: Option<String>, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw {
        Some(v) => Ok(v.trim().parse::<T>()?),
        None => Ok(default),
    }
}

/// Parse a ttl such as `7d`, `12h`, `30m`, `45s` or a bare number of seconds.
pub fn parse_ttl(raw: &str) -> Result<Duration> {
    let raw = raw.trim();
    let (digits, unit) = match raw.char_indices().find(|(_, c)| !c.is_ascii_digit()) {
        Some((idx, _)) => raw.split_at(idx),
        None => (raw, "s"),
    };

    let value: u64 = digits
        .parse()
        .with_context(|| format!("'{raw}' does not start with a number"))?;

    let multiplier = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        "d" => 86_400,
        other => bail!("unknown ttl unit '{other}' in '{raw}'"),
    };

    if value == 0 {
        bail!("ttl must be positive");
    }

    let secs = value
        .checked_mul(multiplier)
        .with_context(|| format!("ttl '{raw}' is too large"))?;
    Ok(Duration::from_secs(secs))
}
