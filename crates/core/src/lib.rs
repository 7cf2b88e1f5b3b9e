//! Liquidation bot core logic.
//!
//! This crate provides the decision-and-execution engine:
//! - Health-factor zone classification and per-zone re-scan monitors
//! - Position tracker re-reading borrower account data on every trigger
//! - Pure liquidation-opportunity estimator (collateral/debt selection)
//! - Execution driver (own-liquidity vs flash-loan funding, swap legs)
//! - Persisted liquidation queue state machine with staleness recovery
//! - One-shot deferred re-check scheduling
//!
//! Targets Aave-V2-style lending pools across multiple EVM networks.

pub mod config;
mod estimator;
mod executor;
mod monitor;
mod queue;
mod recheck;
mod tracker;
pub mod wad_math;
mod zone;

pub use config::{BotConfig, IngestorConfig, MonitorConfig, NetworkSeed, QueueConfig, ZoneConfig};
pub use estimator::{estimate, Opportunity, ReserveSnapshot, UserReserves};
pub use executor::{ExecutionDriver, ProfitEstimate};
pub use monitor::ZoneMonitor;
pub use queue::{select_best, LiquidationQueue, QueueWorker};
pub use recheck::{RecheckScheduler, RefreshRequest};
pub use tracker::{normalize_health_factor, PositionTracker};
pub use zone::Zone;
