//! Persistence layer for the liquidation bot.
//!
//! Backed by SQLite via sqlx. Holds the durable state the rest of the
//! system coordinates through:
//! - networks (RPC endpoints, wallet native balance, active flag)
//! - listeners (watched contracts and their resumable block cursor)
//! - tokens (reserve assets with risk parameters and wallet balances)
//! - user accounts (per-network borrower aggregates and health factor)
//! - liquidation candidates (the queue state machine rows)
//!
//! Schema bootstrap is a set of idempotent `CREATE TABLE IF NOT EXISTS`
//! statements; migration tooling lives outside this crate.

mod accounts;
mod candidates;
mod listeners;
mod models;
mod networks;
mod tokens;

pub use models::{
    CandidateRecord, CandidateStatus, HfBand, ListenerRecord, NetworkRecord, NewUserAccount,
    TokenRecord, UserAccountRecord, HF_NO_DEBT,
};

use sqlx::sqlite::SqlitePool;
use tracing::info;

/// Store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("user account not found: {address} on {network}")]
    UserNotFound { address: String, network: String },
    #[error("token not found: {address} on {network}")]
    TokenNotFound { address: String, network: String },
}

pub type Result<T> = std::result::Result<T, StoreError>;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS networks (
    id              TEXT PRIMARY KEY,
    rpc_url         TEXT,
    reserve_rpc_url TEXT,
    balance         TEXT NOT NULL DEFAULT '0',
    is_active       INTEGER NOT NULL DEFAULT 0,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS listeners (
    contract_address TEXT NOT NULL,
    name             TEXT NOT NULL,
    network_id       TEXT NOT NULL REFERENCES networks(id) ON DELETE CASCADE,
    last_block       INTEGER,
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL,
    PRIMARY KEY (contract_address, network_id)
);

CREATE TABLE IF NOT EXISTS tokens (
    address               TEXT NOT NULL,
    network_id            TEXT NOT NULL REFERENCES networks(id) ON DELETE CASCADE,
    symbol                TEXT NOT NULL,
    decimals              INTEGER NOT NULL,
    ltv                   TEXT NOT NULL,
    liquidation_threshold TEXT NOT NULL,
    liquidation_bonus     INTEGER NOT NULL,
    reserve_factor        TEXT NOT NULL,
    usage_as_collateral   INTEGER NOT NULL,
    borrowing_enabled     INTEGER NOT NULL,
    stable_rate_enabled   INTEGER NOT NULL,
    is_active             INTEGER NOT NULL,
    is_frozen             INTEGER NOT NULL,
    a_token               TEXT NOT NULL,
    stable_debt_token     TEXT NOT NULL,
    variable_debt_token   TEXT NOT NULL,
    balance               TEXT NOT NULL DEFAULT '0',
    created_at            TEXT NOT NULL,
    updated_at            TEXT NOT NULL,
    PRIMARY KEY (address, network_id)
);

CREATE TABLE IF NOT EXISTS user_accounts (
    id                            INTEGER PRIMARY KEY AUTOINCREMENT,
    address                       TEXT NOT NULL,
    network_id                    TEXT NOT NULL REFERENCES networks(id) ON DELETE CASCADE,
    total_collateral_eth          TEXT NOT NULL,
    total_debt_eth                TEXT NOT NULL,
    available_borrows_eth         TEXT NOT NULL,
    current_liquidation_threshold TEXT NOT NULL,
    ltv                           TEXT NOT NULL,
    health_factor                 REAL NOT NULL,
    created_at                    TEXT NOT NULL,
    updated_at                    TEXT NOT NULL,
    UNIQUE (address, network_id)
);

CREATE TABLE IF NOT EXISTS candidates (
    id                   INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id              INTEGER NOT NULL REFERENCES user_accounts(id) ON DELETE CASCADE,
    status               TEXT NOT NULL,
    estimated_profit_eth TEXT NOT NULL,
    fact_profit_eth      TEXT,
    to_update_date       TEXT,
    error                TEXT,
    created_at           TEXT NOT NULL,
    updated_at           TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS candidates_one_active_per_user
    ON candidates(user_id)
    WHERE status IN ('pending', 'processing', 'deferred');
"#;

/// SQLite-backed store shared by every worker.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Connect to the database at `url` (e.g. `sqlite://vigil.db?mode=rwc`).
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(url).await?;
        Ok(Self { pool })
    }

    /// Open an in-memory database, used by tests.
    pub async fn in_memory() -> Result<Self> {
        Self::connect("sqlite::memory:").await
    }

    /// Create tables and indexes if they do not exist yet.
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        info!("Database schema ready");
        Ok(())
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[cfg(test)]
pub(crate) async fn test_store() -> Store {
    let store = Store::in_memory().await.unwrap();
    store.init_schema().await.unwrap();
    store
}
