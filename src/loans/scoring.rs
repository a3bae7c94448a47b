//! ESG and credit risk scoring
//! Mission: Pure scoring rules, persisted by the loan store

use serde::{Deserialize, Serialize};
use std::str::FromStr;

const ESG_BASE: f64 = 5.0;
const ESG_GREEN_BONUS: f64 = 3.0;
const ESG_HIGH_IMPACT_PENALTY: f64 = 2.0;
const ESG_SME_BONUS: f64 = 1.0;
const SME_AMOUNT_LIMIT: f64 = 1_000_000.0;
const LARGE_EXPOSURE_AMOUNT: f64 = 5_000_000.0;

pub const MIN_CREDIT_SCORE: u16 = 300;
pub const MAX_CREDIT_SCORE: u16 = 850;

const GREEN_INDUSTRIES: [&str; 3] = ["renewable_energy", "clean_tech", "sustainable_agriculture"];
const HIGH_IMPACT_INDUSTRIES: [&str; 3] = ["oil_gas", "mining", "heavy_manufacturing"];

/// Credit rating scale, best first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskRating {
    Aaa,
    Aa,
    A,
    Bbb,
    Bb,
    B,
    Ccc,
    Cc,
    C,
    D,
}

impl RiskRating {
    const ALL: [RiskRating; 10] = [
        RiskRating::Aaa,
        RiskRating::Aa,
        RiskRating::A,
        RiskRating::Bbb,
        RiskRating::Bb,
        RiskRating::B,
        RiskRating::Ccc,
        RiskRating::Cc,
        RiskRating::C,
        RiskRating::D,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskRating::Aaa => "AAA",
            RiskRating::Aa => "AA",
            RiskRating::A => "A",
            RiskRating::Bbb => "BBB",
            RiskRating::Bb => "BB",
            RiskRating::B => "B",
            RiskRating::Ccc => "CCC",
            RiskRating::Cc => "CC",
            RiskRating::C => "C",
            RiskRating::D => "D",
        }
    }

    /// Base rating from the credit score alone
    pub fn from_credit_score(score: u16) -> Self {
        match score {
            800..=u16::MAX => RiskRating::Aaa,
            750..=799 => RiskRating::Aa,
            700..=749 => RiskRating::A,
            650..=699 => RiskRating::Bbb,
            600..=649 => RiskRating::Bb,
            550..=599 => RiskRating::B,
            500..=549 => RiskRating::Ccc,
            450..=499 => RiskRating::Cc,
            400..=449 => RiskRating::C,
            _ => RiskRating::D,
        }
    }

    /// One notch down, for the speculative grades only
    fn large_exposure_downgrade(self) -> Self {
        match self {
            RiskRating::B => RiskRating::Ccc,
            RiskRating::Ccc => RiskRating::Cc,
            RiskRating::Cc => RiskRating::C,
            RiskRating::C => RiskRating::D,
            other => other,
        }
    }
}

impl FromStr for RiskRating {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RiskRating::ALL
            .into_iter()
            .find(|rating| rating.as_str() == s)
            .ok_or_else(|| format!("unknown risk rating '{s}'"))
    }
}

/// ESG score in `0.0..=10.0`
pub fn esg_score(industry: Option<&str>, amount: f64) -> f64 {
    let mut score = ESG_BASE;

    match industry {
        Some(i) if GREEN_INDUSTRIES.contains(&i) => score += ESG_GREEN_BONUS,
        Some(i) if HIGH_IMPACT_INDUSTRIES.contains(&i) => score -= ESG_HIGH_IMPACT_PENALTY,
        _ => {}
    }

    if amount < SME_AMOUNT_LIMIT {
        score += ESG_SME_BONUS;
    }

    score.clamp(0.0, 10.0)
}

/// Risk rating from credit score, downgraded one notch for large speculative loans
pub fn risk_rating(credit_score: u16, amount: f64) -> RiskRating {
    let base = RiskRating::from_credit_score(credit_score);
    if amount > LARGE_EXPOSURE_AMOUNT {
        base.large_exposure_downgrade()
    } else {
        base
    }
}
