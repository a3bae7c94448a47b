//! LMA Edge Backend Library
//!
//! Loan management API: JWT sessions with cache-backed revocation,
//! role-based access control, and loan records with ESG/risk scoring.
//! The binary in `main.rs` only wires configuration, logging and the listener.

pub mod app;
pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod loans;
pub mod middleware;
pub mod validation;

pub use app::{build_router, AppState};
pub use config::Config;
pub use error::ApiError;
