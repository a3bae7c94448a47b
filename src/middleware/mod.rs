//! Middleware for observability, rate limiting and error detail.
//!
//! This module provides:
//! - Request logging with latency tracking
//! - Rate limiting per IP address
//! - Internal error detail in development mode

pub mod errors;
pub mod logging;
pub mod rate_limit;

pub use errors::expose_internal_errors;
pub use logging::request_logging;
pub use rate_limit::{rate_limit, RateLimitConfig, RateLimiter};
