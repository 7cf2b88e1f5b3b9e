//! Row types shared with the rest of the workspace.
//!
//! Wei-denominated quantities are stored as decimal TEXT so SQLite never
//! truncates a 256-bit value; callers parse them into U256/I256.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Health-factor sentinel meaning "no debt / infinite health".
pub const HF_NO_DEBT: f64 = -1.0;

/// One blockchain the bot operates on.
#[derive(Debug, Clone, FromRow)]
pub struct NetworkRecord {
    pub id: String,
    pub rpc_url: Option<String>,
    pub reserve_rpc_url: Option<String>,
    /// Wallet native-currency balance, wei as decimal text.
    pub balance: String,
    pub is_active: bool,
}

/// A watched contract instance on one network.
#[derive(Debug, Clone, FromRow)]
pub struct ListenerRecord {
    pub contract_address: String,
    pub name: String,
    pub network_id: String,
    /// Last confirmed block processed; None until the first batch lands.
    pub last_block: Option<i64>,
}

/// A reserve asset tracked on one network.
#[derive(Debug, Clone, FromRow)]
pub struct TokenRecord {
    pub address: String,
    pub network_id: String,
    pub symbol: String,
    pub decimals: i64,
    pub ltv: String,
    pub liquidation_threshold: String,
    /// Liquidation bonus in basis points (10750 = 7.5% premium).
    pub liquidation_bonus: i64,
    pub reserve_factor: String,
    pub usage_as_collateral: bool,
    pub borrowing_enabled: bool,
    pub stable_rate_enabled: bool,
    pub is_active: bool,
    pub is_frozen: bool,
    pub a_token: String,
    pub stable_debt_token: String,
    pub variable_debt_token: String,
    /// Bot wallet balance of this token, raw units as decimal text.
    pub balance: String,
}

/// One borrower on one network.
#[derive(Debug, Clone, FromRow)]
pub struct UserAccountRecord {
    pub id: i64,
    pub address: String,
    pub network_id: String,
    pub total_collateral_eth: String,
    pub total_debt_eth: String,
    pub available_borrows_eth: String,
    pub current_liquidation_threshold: String,
    pub ltv: String,
    pub health_factor: f64,
    pub updated_at: DateTime<Utc>,
}

/// Upsert payload for a borrower row.
#[derive(Debug, Clone)]
pub struct NewUserAccount {
    pub address: String,
    pub network_id: String,
    pub total_collateral_eth: String,
    pub total_debt_eth: String,
    pub available_borrows_eth: String,
    pub current_liquidation_threshold: String,
    pub ltv: String,
    pub health_factor: f64,
}

/// Liquidation queue entry status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
pub enum CandidateStatus {
    Pending,
    Processing,
    Deferred,
    Liquidated,
    Cancelled,
    Error,
}

impl CandidateStatus {
    /// Terminal states never transition again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Liquidated | Self::Cancelled | Self::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Deferred => "deferred",
            Self::Liquidated => "liquidated",
            Self::Cancelled => "cancelled",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for CandidateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One liquidation queue entry, joined with its owner for dispatch.
#[derive(Debug, Clone, FromRow)]
pub struct CandidateRecord {
    pub id: i64,
    pub user_id: i64,
    pub status: CandidateStatus,
    /// Estimated profit in ETH-equivalent wei, signed decimal text.
    pub estimated_profit_eth: String,
    pub fact_profit_eth: Option<String>,
    pub to_update_date: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Owner columns from the join.
    pub address: String,
    pub network_id: String,
}

/// Health-factor band used to select users for a monitoring zone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HfBand {
    /// `hf == -1` sentinel rows only.
    NoDebt,
    /// `hf < max` (sentinel excluded).
    Under(f64),
    /// `min <= hf <= max`.
    Closed(f64, f64),
    /// `min < hf <= max`.
    HalfOpen(f64, f64),
    /// `hf > min`.
    Above(f64),
}
