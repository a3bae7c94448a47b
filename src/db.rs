//! SQLite-backed relational store
//! Mission: Own the single connection and run every statement off the async runtime
//!
//! Every call runs on the blocking pool and is bounded by the configured
//! timeout. The connection lock is only ever taken inside the blocking task.

use anyhow::{anyhow, Context, Result};
use parking_lot::Mutex; // Faster than std::sync::Mutex
use rusqlite::{Connection, OpenFlags};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Schema for users and loans
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    email TEXT UNIQUE NOT NULL,
    password_hash TEXT NOT NULL,
    first_name TEXT NOT NULL,
    last_name TEXT NOT NULL,
    role TEXT NOT NULL,
    organization TEXT,
    phone TEXT,
    status TEXT NOT NULL DEFAULT 'active',
    kyc_verified INTEGER NOT NULL DEFAULT 0,
    last_login TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_users_created_at ON users(created_at DESC);

CREATE TABLE IF NOT EXISTS loans (
    id TEXT PRIMARY KEY,
    loan_number TEXT UNIQUE NOT NULL,
    borrower_id TEXT NOT NULL,
    lender_id TEXT,
    arranger_id TEXT,
    loan_type TEXT NOT NULL,
    amount REAL NOT NULL,
    currency TEXT NOT NULL DEFAULT 'USD',
    interest_rate REAL NOT NULL,
    term_months INTEGER NOT NULL,
    purpose TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'draft',
    payment_frequency TEXT NOT NULL DEFAULT 'monthly',
    collateral_description TEXT,
    credit_score INTEGER,
    risk_rating TEXT,
    esg_score REAL,
    industry TEXT,
    geography TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_loans_created_at ON loans(created_at DESC);
CREATE INDEX IF NOT EXISTS idx_loans_status ON loans(status);
CREATE INDEX IF NOT EXISTS idx_loans_borrower ON loans(borrower_id);
"#;

/// Handle to the relational store
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    timeout: Duration,
}

impl Database {
    /// Open (or create) the database file and apply the schema
    pub fn open(db_path: &str, timeout: Duration) -> Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX; // We handle our own locking

        let conn = Connection::open_with_flags(db_path, flags)
            .with_context(|| format!("Failed to open database at {}", db_path))?;

        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "synchronous", "NORMAL").ok();

        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap_or_default();
        if journal_mode.to_lowercase() != "wal" {
            warn!("WAL mode not active, journal_mode = {}", journal_mode);
        }

        info!("Database opened at: {}", db_path);
        Self::with_connection(conn, timeout)
    }

    /// Private in-memory database, used by tests
    pub fn open_in_memory(timeout: Duration) -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::with_connection(conn, timeout)
    }

    fn with_connection(conn: Connection, timeout: Duration) -> Result<Self> {
        conn.execute_batch(SCHEMA_SQL)
            .context("Failed to initialize database schema")?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            timeout,
        })
    }

    /// Run `f` against the connection on the blocking pool, bounded by the timeout.
    pub async fn call<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        let task = tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            f(&conn)
        });

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(anyhow!("database task failed: {join_err}")),
            Err(_) => Err(anyhow!("database call timed out after {:?}", self.timeout)),
        }
    }

    /// Liveness check used by the health endpoint
    pub async fn ping(&self) -> Result<()> {
        self.call(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                .context("SELECT 1 failed")?;
            Ok(())
        })
        .await
    }
}

/// Column value that does not parse into its Rust type
pub(crate) fn conversion_error(column: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        rusqlite::types::Type::Text,
        message.into(),
    )
}
