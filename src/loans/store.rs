//! Loan Storage
//! Mission: Persist loans in SQLite behind the `loan:<id>` snapshot cache
//!
//! Same discipline as the user store: reads are cache-then-store, every
//! write is store-then-invalidate.

use crate::{
    cache::{CacheClient, EntityCache},
    db::{conversion_error, Database},
    loans::{
        models::{
            CreateLoan, Loan, LoanFilters, LoanStatistics, LoanStatus, LoanUpdate,
            PaymentFrequency,
        },
        scoring::{self, RiskRating},
    },
};
use anyhow::{Context, Result};
use chrono::Utc;
use rand::Rng;
use rusqlite::{params, OptionalExtension, Row};
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

const LOAN_COLUMNS: &str = "id, loan_number, borrower_id, lender_id, arranger_id, loan_type, \
                            amount, currency, interest_rate, term_months, purpose, status, \
                            payment_frequency, collateral_description, credit_score, \
                            risk_rating, esg_score, industry, geography, created_at, updated_at";

const BASE36: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DEFAULT_CURRENCY: &str = "USD";

/// Loan repository
#[derive(Clone)]
pub struct LoanStore {
    db: Database,
    snapshots: EntityCache<Loan>,
}

impl LoanStore {
    pub fn new(db: Database, cache: CacheClient, snapshot_ttl: Duration) -> Self {
        Self {
            db,
            snapshots: EntityCache::new(cache, "loan", snapshot_ttl),
        }
    }

    pub fn cache_key(&self, loan_id: &str) -> String {
        self.snapshots.key(loan_id)
    }

    /// Create a draft loan and cache its snapshot
    pub async fn create(&self, req: CreateLoan) -> Result<Loan> {
        let now = Utc::now();
        let loan = Loan {
            id: Uuid::new_v4().to_string(),
            loan_number: generate_loan_number(now.timestamp_millis()),
            borrower_id: req.borrower_id,
            lender_id: None,
            arranger_id: None,
            loan_type: req.loan_type,
            amount: req.amount,
            currency: req.currency.unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            interest_rate: req.interest_rate,
            term_months: req.term_months,
            purpose: req.purpose,
            status: LoanStatus::Draft,
            payment_frequency: req.payment_frequency.unwrap_or_default(),
            collateral_description: req.collateral_description,
            credit_score: None,
            risk_rating: None,
            esg_score: None,
            industry: req.industry,
            geography: req.geography,
            created_at: now,
            updated_at: now,
        };

        self.db
            .call({
                let loan = loan.clone();
                move |conn| {
                    conn.execute(
                        &format!(
                            "INSERT INTO loans ({LOAN_COLUMNS}) VALUES
                             (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                              ?15, ?16, ?17, ?18, ?19, ?20, ?21)"
                        ),
                        params![
                            loan.id,
                            loan.loan_number,
                            loan.borrower_id,
                            loan.lender_id,
                            loan.arranger_id,
                            loan.loan_type.as_str(),
                            loan.amount,
                            loan.currency,
                            loan.interest_rate,
                            loan.term_months,
                            loan.purpose,
                            loan.status.as_str(),
                            loan.payment_frequency.as_str(),
                            loan.collateral_description,
                            loan.credit_score,
                            loan.risk_rating.map(|r| r.as_str()),
                            loan.esg_score,
                            loan.industry,
                            loan.geography,
                            loan.created_at,
                            loan.updated_at,
                        ],
                    )
                    .context("Failed to insert loan")?;
                    Ok(())
                }
            })
            .await?;

        self.snapshots.put(&loan.id, &loan).await;
        info!("Created loan {} ({})", loan.loan_number, loan.id);
        Ok(loan)
    }

    /// Get a loan by id, serving from the snapshot cache when possible
    pub async fn get(&self, loan_id: &str) -> Result<Option<Loan>> {
        let id = loan_id.to_string();
        let db = self.db.clone();
        self.snapshots
            .load(loan_id, move || async move {
                db.call(move |conn| {
                    conn.query_row(
                        &format!("SELECT {LOAN_COLUMNS} FROM loans WHERE id = ?1"),
                        params![id],
                        loan_from_row,
                    )
                    .optional()
                    .context("Failed to load loan")
                })
                .await
            })
            .await
    }

    /// List loans matching every given filter, newest first
    pub async fn list(&self, filters: LoanFilters) -> Result<Vec<Loan>> {
        self.db
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {LOAN_COLUMNS} FROM loans
                     WHERE (?1 IS NULL OR status = ?1)
                       AND (?2 IS NULL OR borrower_id = ?2)
                       AND (?3 IS NULL OR lender_id = ?3)
                       AND (?4 IS NULL OR loan_type = ?4)
                       AND (?5 IS NULL OR industry = ?5)
                       AND (?6 IS NULL OR amount >= ?6)
                       AND (?7 IS NULL OR amount <= ?7)
                     ORDER BY created_at DESC"
                ))?;

                let loans = stmt
                    .query_map(
                        params![
                            filters.status.map(|s| s.as_str()),
                            filters.borrower_id,
                            filters.lender_id,
                            filters.loan_type.map(|t| t.as_str()),
                            filters.industry,
                            filters.min_amount,
                            filters.max_amount,
                        ],
                        loan_from_row,
                    )?
                    .collect::<Result<Vec<_>, _>>()
                    .context("Failed to list loans")?;

                Ok(loans)
            })
            .await
    }

    pub async fn statistics(&self) -> Result<LoanStatistics> {
        self.db
            .call(|conn| {
                conn.query_row(
                    "SELECT
                        COUNT(*),
                        COALESCE(SUM(amount), 0.0),
                        AVG(interest_rate),
                        COUNT(CASE WHEN status = 'active' THEN 1 END),
                        COUNT(CASE WHEN status = 'defaulted' THEN 1 END)
                     FROM loans",
                    [],
                    |row| {
                        Ok(LoanStatistics {
                            total_loans: row.get(0)?,
                            total_amount: row.get(1)?,
                            avg_interest_rate: row.get(2)?,
                            active_loans: row.get(3)?,
                            defaulted_loans: row.get(4)?,
                        })
                    },
                )
                .context("Failed to compute loan statistics")
            })
            .await
    }

    /// Apply an allow-listed partial update. Returns `None` if no such loan exists.
    pub async fn update(&self, loan_id: &str, update: LoanUpdate) -> Result<Option<Loan>> {
        let id = loan_id.to_string();
        let updated = self
            .db
            .call(move |conn| {
                let rows = conn
                    .execute(
                        "UPDATE loans SET
                            amount = COALESCE(?1, amount),
                            interest_rate = COALESCE(?2, interest_rate),
                            term_months = COALESCE(?3, term_months),
                            purpose = COALESCE(?4, purpose),
                            payment_frequency = COALESCE(?5, payment_frequency),
                            collateral_description = COALESCE(?6, collateral_description),
                            industry = COALESCE(?7, industry),
                            geography = COALESCE(?8, geography),
                            updated_at = ?9
                         WHERE id = ?10",
                        params![
                            update.amount,
                            update.interest_rate,
                            update.term_months,
                            update.purpose,
                            update.payment_frequency.map(|f| f.as_str()),
                            update.collateral_description,
                            update.industry,
                            update.geography,
                            Utc::now(),
                            id,
                        ],
                    )
                    .context("Failed to update loan")?;

                if rows == 0 {
                    return Ok(None);
                }
                reload(conn, &id)
            })
            .await?;

        self.snapshots.invalidate(loan_id).await;
        Ok(updated)
    }

    pub async fn update_status(&self, loan_id: &str, status: LoanStatus) -> Result<Option<Loan>> {
        let id = loan_id.to_string();
        let updated = self
            .db
            .call(move |conn| {
                let rows = conn
                    .execute(
                        "UPDATE loans SET status = ?1, updated_at = ?2 WHERE id = ?3",
                        params![status.as_str(), Utc::now(), id],
                    )
                    .context("Failed to update loan status")?;

                if rows == 0 {
                    return Ok(None);
                }
                reload(conn, &id)
            })
            .await?;

        self.snapshots.invalidate(loan_id).await;
        if updated.is_some() {
            info!("Loan {} status -> {}", loan_id, status.as_str());
        }
        Ok(updated)
    }

    /// Score and persist the ESG rating. Returns `None` if no such loan exists.
    pub async fn assess_esg(&self, loan_id: &str) -> Result<Option<f64>> {
        let Some(loan) = self.get(loan_id).await? else {
            return Ok(None);
        };

        let score = scoring::esg_score(loan.industry.as_deref(), loan.amount);
        let id = loan_id.to_string();
        self.db
            .call(move |conn| {
                conn.execute(
                    "UPDATE loans SET esg_score = ?1, updated_at = ?2 WHERE id = ?3",
                    params![score, Utc::now(), id],
                )
                .context("Failed to store ESG score")?;
                Ok(())
            })
            .await?;

        self.snapshots.invalidate(loan_id).await;
        Ok(Some(score))
    }

    /// Rate and persist credit risk. Returns `None` if no such loan exists.
    pub async fn assess_risk(&self, loan_id: &str, credit_score: u16) -> Result<Option<RiskRating>> {
        let Some(loan) = self.get(loan_id).await? else {
            return Ok(None);
        };

        let rating = scoring::risk_rating(credit_score, loan.amount);
        let id = loan_id.to_string();
        self.db
            .call(move |conn| {
                conn.execute(
                    "UPDATE loans SET risk_rating = ?1, credit_score = ?2, updated_at = ?3
                     WHERE id = ?4",
                    params![rating.as_str(), credit_score, Utc::now(), id],
                )
                .context("Failed to store risk rating")?;
                Ok(())
            })
            .await?;

        self.snapshots.invalidate(loan_id).await;
        Ok(Some(rating))
    }

    /// Delete a loan. Returns `false` if no such loan exists.
    pub async fn delete(&self, loan_id: &str) -> Result<bool> {
        let id = loan_id.to_string();
        let deleted = self
            .db
            .call(move |conn| {
                let rows = conn
                    .execute("DELETE FROM loans WHERE id = ?1", params![id])
                    .context("Failed to delete loan")?;
                Ok(rows > 0)
            })
            .await?;

        self.snapshots.invalidate(loan_id).await;
        if deleted {
            info!("Deleted loan {}", loan_id);
        }
        Ok(deleted)
    }
}

fn reload(conn: &rusqlite::Connection, id: &str) -> Result<Option<Loan>> {
    conn.query_row(
        &format!("SELECT {LOAN_COLUMNS} FROM loans WHERE id = ?1"),
        params![id],
        loan_from_row,
    )
    .optional()
    .context("Failed to reload loan")
}

fn loan_from_row(row: &Row<'_>) -> rusqlite::Result<Loan> {
    let loan_type: String = row.get(5)?;
    let status: String = row.get(11)?;
    let payment_frequency: String = row.get(12)?;
    let risk_rating: Option<String> = row.get(15)?;

    Ok(Loan {
        id: row.get(0)?,
        loan_number: row.get(1)?,
        borrower_id: row.get(2)?,
        lender_id: row.get(3)?,
        arranger_id: row.get(4)?,
        loan_type: loan_type.parse().map_err(|e| conversion_error(5, e))?,
        amount: row.get(6)?,
        currency: row.get(7)?,
        interest_rate: row.get(8)?,
        term_months: row.get(9)?,
        purpose: row.get(10)?,
        status: status.parse().map_err(|e| conversion_error(11, e))?,
        payment_frequency: payment_frequency
            .parse::<PaymentFrequency>()
            .map_err(|e| conversion_error(12, e))?,
        collateral_description: row.get(13)?,
        credit_score: row.get(14)?,
        risk_rating: risk_rating
            .map(|r| r.parse())
            .transpose()
            .map_err(|e| conversion_error(15, e))?,
        esg_score: row.get(16)?,
        industry: row.get(17)?,
        geography: row.get(18)?,
        created_at: row.get(19)?,
        updated_at: row.get(20)?,
    })
}

/// `LN-<base36 millis>-<5 random base36 chars>`, upper case
pub fn generate_loan_number(timestamp_millis: i64) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..5)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("LN-{}-{}", to_base36(timestamp_millis.unsigned_abs()), suffix)
}

fn to_base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(BASE36[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{Cache, MemoryCache};
    use crate::loans::models::LoanType;
    use regex::Regex;
    use std::sync::Arc;

    fn create_test_store() -> (LoanStore, MemoryCache) {
        let db = Database::open_in_memory(Duration::from_secs(5)).unwrap();
        let memory = MemoryCache::new();
        let cache = CacheClient::new(Arc::new(memory.clone()), Duration::from_millis(100));
        (LoanStore::new(db, cache, Duration::from_secs(3600)), memory)
    }

    fn new_loan(amount: f64, industry: Option<&str>) -> CreateLoan {
        CreateLoan {
            borrower_id: "5f8d0c1e-3b4a-4c2d-9e8f-0a1b2c3d4e5f".to_string(),
            loan_type: LoanType::Term,
            amount,
            currency: None,
            interest_rate: 0.05,
            term_months: 36,
            purpose: "Working capital for expansion".to_string(),
            payment_frequency: None,
            collateral_description: None,
            industry: industry.map(str::to_string),
            geography: None,
        }
    }

    #[test]
    fn test_base36() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "Z");
        assert_eq!(to_base36(36), "10");
        assert_eq!(to_base36(1_700_000_000_000), "LOYW3V28");
    }

    #[test]
    fn test_loan_number_format() {
        let pattern = Regex::new(r"^LN-[0-9A-Z]+-[0-9A-Z]{5}$").unwrap();
        for _ in 0..50 {
            let number = generate_loan_number(Utc::now().timestamp_millis());
            assert!(pattern.is_match(&number), "{number}");
        }
    }

    #[tokio::test]
    async fn test_create_defaults_and_caches() {
        let (store, memory) = create_test_store();
        let loan = store.create(new_loan(500_000.0, None)).await.unwrap();

        assert_eq!(loan.status, LoanStatus::Draft);
        assert_eq!(loan.currency, "USD");
        assert_eq!(loan.payment_frequency, PaymentFrequency::Monthly);
        assert!(memory.exists(&store.cache_key(&loan.id)).await.unwrap());

        let loaded = store.get(&loan.id).await.unwrap().unwrap();
        assert_eq!(loaded.loan_number, loan.loan_number);
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_invalidates_snapshot() {
        let (store, memory) = create_test_store();
        let loan = store.create(new_loan(500_000.0, None)).await.unwrap();

        let updated = store
            .update(
                &loan.id,
                LoanUpdate {
                    amount: Some(750_000.0),
                    geography: Some("EMEA".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.amount, 750_000.0);
        assert_eq!(updated.interest_rate, 0.05);
        assert_eq!(updated.geography.as_deref(), Some("EMEA"));
        assert!(!memory.exists(&store.cache_key(&loan.id)).await.unwrap());

        assert_eq!(store.get(&loan.id).await.unwrap().unwrap().amount, 750_000.0);
        assert!(store
            .update("missing", LoanUpdate::default())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_scoring_is_persisted() {
        let (store, _memory) = create_test_store();
        let loan = store
            .create(new_loan(2_000_000.0, Some("oil_gas")))
            .await
            .unwrap();

        assert_eq!(store.assess_esg(&loan.id).await.unwrap(), Some(3.0));
        assert_eq!(
            store.assess_risk(&loan.id, 620).await.unwrap(),
            Some(RiskRating::Bb)
        );

        let reloaded = store.get(&loan.id).await.unwrap().unwrap();
        assert_eq!(reloaded.esg_score, Some(3.0));
        assert_eq!(reloaded.credit_score, Some(620));
        assert_eq!(reloaded.risk_rating, Some(RiskRating::Bb));

        assert!(store.assess_esg("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_filters_and_statistics() {
        let (store, _memory) = create_test_store();
        let small = store.create(new_loan(100_000.0, Some("mining"))).await.unwrap();
        store.create(new_loan(900_000.0, None)).await.unwrap();
        store.create(new_loan(6_000_000.0, None)).await.unwrap();
        store
            .update_status(&small.id, LoanStatus::Active)
            .await
            .unwrap();

        assert_eq!(store.list(LoanFilters::default()).await.unwrap().len(), 3);

        let mid = store
            .list(LoanFilters {
                min_amount: Some(100_000.0),
                max_amount: Some(1_000_000.0),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(mid.len(), 2);

        let active = store
            .list(LoanFilters {
                status: Some(LoanStatus::Active),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].industry.as_deref(), Some("mining"));

        let stats = store.statistics().await.unwrap();
        assert_eq!(stats.total_loans, 3);
        assert_eq!(stats.total_amount, 7_000_000.0);
        assert_eq!(stats.active_loans, 1);
        assert_eq!(stats.defaulted_loans, 0);
    }

    #[tokio::test]
    async fn test_empty_statistics() {
        let (store, _memory) = create_test_store();
        let stats = store.statistics().await.unwrap();
        assert_eq!(stats.total_loans, 0);
        assert_eq!(stats.total_amount, 0.0);
        assert_eq!(stats.avg_interest_rate, None);
    }

    #[tokio::test]
    async fn test_delete() {
        let (store, memory) = create_test_store();
        let loan = store.create(new_loan(500_000.0, None)).await.unwrap();

        assert!(store.delete(&loan.id).await.unwrap());
        assert!(!memory.exists(&store.cache_key(&loan.id)).await.unwrap());
        assert!(store.get(&loan.id).await.unwrap().is_none());
        assert!(!store.delete(&loan.id).await.unwrap());
    }
}
