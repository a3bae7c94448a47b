//! Loan models

use crate::{
    error::ApiError,
    loans::scoring::{RiskRating, MAX_CREDIT_SCORE, MIN_CREDIT_SCORE},
    validation::{self, Validate},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Loan lifecycle status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    Draft,
    PendingApproval,
    Approved,
    Rejected,
    Active,
    Defaulted,
    PaidOff,
}

impl LoanStatus {
    const ALL: [LoanStatus; 7] = [
        LoanStatus::Draft,
        LoanStatus::PendingApproval,
        LoanStatus::Approved,
        LoanStatus::Rejected,
        LoanStatus::Active,
        LoanStatus::Defaulted,
        LoanStatus::PaidOff,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Draft => "draft",
            LoanStatus::PendingApproval => "pending_approval",
            LoanStatus::Approved => "approved",
            LoanStatus::Rejected => "rejected",
            LoanStatus::Active => "active",
            LoanStatus::Defaulted => "defaulted",
            LoanStatus::PaidOff => "paid_off",
        }
    }
}

impl FromStr for LoanStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LoanStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown loan status '{s}'"))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LoanType {
    Term,
    Revolver,
    Bridge,
    Syndicated,
}

impl LoanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanType::Term => "term",
            LoanType::Revolver => "revolver",
            LoanType::Bridge => "bridge",
            LoanType::Syndicated => "syndicated",
        }
    }
}

impl FromStr for LoanType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "term" => Ok(LoanType::Term),
            "revolver" => Ok(LoanType::Revolver),
            "bridge" => Ok(LoanType::Bridge),
            "syndicated" => Ok(LoanType::Syndicated),
            other => Err(format!("unknown loan type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum PaymentFrequency {
    #[default]
    Monthly,
    Quarterly,
    SemiAnnual,
    Annual,
}

impl PaymentFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentFrequency::Monthly => "monthly",
            PaymentFrequency::Quarterly => "quarterly",
            PaymentFrequency::SemiAnnual => "semi-annual",
            PaymentFrequency::Annual => "annual",
        }
    }
}

impl FromStr for PaymentFrequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monthly" => Ok(PaymentFrequency::Monthly),
            "quarterly" => Ok(PaymentFrequency::Quarterly),
            "semi-annual" => Ok(PaymentFrequency::SemiAnnual),
            "annual" => Ok(PaymentFrequency::Annual),
            other => Err(format!("unknown payment frequency '{other}'")),
        }
    }
}

/// Loan row, also cached under `loan:<id>`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Loan {
    pub id: String,
    pub loan_number: String,
    pub borrower_id: String,
    pub lender_id: Option<String>,
    pub arranger_id: Option<String>,
    pub loan_type: LoanType,
    pub amount: f64,
    pub currency: String,
    pub interest_rate: f64,
    pub term_months: u32,
    pub purpose: String,
    pub status: LoanStatus,
    pub payment_frequency: PaymentFrequency,
    pub collateral_description: Option<String>,
    pub credit_score: Option<u16>,
    pub risk_rating: Option<RiskRating>,
    pub esg_score: Option<f64>,
    pub industry: Option<String>,
    pub geography: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// POST /loans body
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateLoan {
    pub borrower_id: String,
    pub loan_type: LoanType,
    pub amount: f64,
    pub currency: Option<String>,
    pub interest_rate: f64,
    pub term_months: u32,
    pub purpose: String,
    pub payment_frequency: Option<PaymentFrequency>,
    pub collateral_description: Option<String>,
    pub industry: Option<String>,
    pub geography: Option<String>,
}

impl Validate for CreateLoan {
    fn validate(&self) -> Result<(), ApiError> {
        validation::uuid("borrower_id", &self.borrower_id)?;
        amount(self.amount)?;
        interest_rate(self.interest_rate)?;
        term_months(self.term_months)?;
        purpose(&self.purpose)?;
        if let Some(currency) = &self.currency {
            validation::currency(currency)?;
        }
        validation::max_length("industry", self.industry.as_deref(), 100)?;
        validation::max_length("geography", self.geography.as_deref(), 100)
    }
}

/// PUT /loans/:id body. Only these columns can be changed this way.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoanUpdate {
    pub amount: Option<f64>,
    pub interest_rate: Option<f64>,
    pub term_months: Option<u32>,
    pub purpose: Option<String>,
    pub payment_frequency: Option<PaymentFrequency>,
    pub collateral_description: Option<String>,
    pub industry: Option<String>,
    pub geography: Option<String>,
}

impl LoanUpdate {
    pub fn is_empty(&self) -> bool {
        self.amount.is_none()
            && self.interest_rate.is_none()
            && self.term_months.is_none()
            && self.purpose.is_none()
            && self.payment_frequency.is_none()
            && self.collateral_description.is_none()
            && self.industry.is_none()
            && self.geography.is_none()
    }
}

impl Validate for LoanUpdate {
    fn validate(&self) -> Result<(), ApiError> {
        if let Some(value) = self.amount {
            amount(value)?;
        }
        if let Some(value) = self.interest_rate {
            interest_rate(value)?;
        }
        if let Some(value) = self.term_months {
            term_months(value)?;
        }
        if let Some(value) = &self.purpose {
            purpose(value)?;
        }
        validation::max_length("industry", self.industry.as_deref(), 100)?;
        validation::max_length("geography", self.geography.as_deref(), 100)
    }
}

/// PATCH /loans/:id/status body
#[derive(Debug, Clone, Deserialize)]
pub struct StatusUpdate {
    pub status: LoanStatus,
}

/// POST /loans/:id/risk-assessment body
#[derive(Debug, Clone, Deserialize)]
pub struct RiskAssessmentRequest {
    pub credit_score: u16,
}

impl Validate for RiskAssessmentRequest {
    fn validate(&self) -> Result<(), ApiError> {
        if !(MIN_CREDIT_SCORE..=MAX_CREDIT_SCORE).contains(&self.credit_score) {
            return Err(ApiError::validation(format!(
                "credit_score must be between {MIN_CREDIT_SCORE} and {MAX_CREDIT_SCORE}"
            )));
        }
        Ok(())
    }
}

/// GET /loans query filters. Absent filters match everything.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoanFilters {
    pub status: Option<LoanStatus>,
    pub borrower_id: Option<String>,
    pub lender_id: Option<String>,
    pub loan_type: Option<LoanType>,
    pub industry: Option<String>,
    pub min_amount: Option<f64>,
    pub max_amount: Option<f64>,
}

/// Portfolio totals
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LoanStatistics {
    pub total_loans: i64,
    pub total_amount: f64,
    pub avg_interest_rate: Option<f64>,
    pub active_loans: i64,
    pub defaulted_loans: i64,
}

fn amount(value: f64) -> Result<(), ApiError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ApiError::validation("amount must be a positive number"));
    }
    Ok(())
}

fn interest_rate(value: f64) -> Result<(), ApiError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ApiError::validation("interest_rate must be between 0 and 1"));
    }
    Ok(())
}

fn term_months(value: u32) -> Result<(), ApiError> {
    if value == 0 {
        return Err(ApiError::validation("term_months must be a positive integer"));
    }
    Ok(())
}

fn purpose(value: &str) -> Result<(), ApiError> {
    if value.trim().chars().count() < 10 {
        return Err(ApiError::validation("purpose must be at least 10 characters"));
    }
    Ok(())
}
