//! Loans Module
//! Mission: Loan records, their cache-aside store and ESG/risk scoring

pub mod api;
pub mod models;
pub mod scoring;
pub mod store;

pub use models::{Loan, LoanStatus};
pub use scoring::RiskRating;
pub use store::LoanStore;
