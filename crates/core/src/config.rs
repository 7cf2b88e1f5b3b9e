//! Configuration management with profile support.
//!
//! All tunables live in one serde-defaulted structure loadable from TOML;
//! `BOT_PROFILE` selects the testing profile (short timers, tiny profit
//! floor) used by integration runs against a local fork. Per-network
//! deployment data is an explicit seeded list injected at startup; nothing
//! is populated lazily at call sites.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration structure containing all bot parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Profile name (for logging/identification)
    #[serde(default = "default_profile_name")]
    pub profile: String,

    /// Health-factor zone thresholds
    #[serde(default)]
    pub zones: ZoneConfig,

    /// Zone monitor cadences
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Liquidation queue timing and profit floor
    #[serde(default)]
    pub queue: QueueConfig,

    /// Event ingestion parameters
    #[serde(default)]
    pub ingestor: IngestorConfig,

    /// Database connection string
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Per-network deployment seeds
    #[serde(default)]
    pub networks: Vec<NetworkSeed>,
}

fn default_profile_name() -> String {
    "default".to_string()
}

fn default_database_url() -> String {
    "sqlite://vigil.db?mode=rwc".to_string()
}

/// Zone classification thresholds (health factor).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneConfig {
    /// Upper bound of the Red zone (1 <= hf <= red)
    #[serde(default = "default_red_threshold")]
    pub red_threshold: f64,

    /// Upper bound of the Orange zone (red < hf <= orange)
    #[serde(default = "default_orange_threshold")]
    pub orange_threshold: f64,
}

fn default_red_threshold() -> f64 {
    1.1
}
fn default_orange_threshold() -> f64 {
    1.5
}

impl Default for ZoneConfig {
    fn default() -> Self {
        Self {
            red_threshold: default_red_threshold(),
            orange_threshold: default_orange_threshold(),
        }
    }
}

/// Re-scan cadence per zone. Urgent and Red run fastest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_urgent_interval")]
    pub urgent_interval_secs: u64,

    #[serde(default = "default_red_interval")]
    pub red_interval_secs: u64,

    #[serde(default = "default_orange_interval")]
    pub orange_interval_secs: u64,

    #[serde(default = "default_yellow_interval")]
    pub yellow_interval_secs: u64,
}

fn default_urgent_interval() -> u64 {
    60
}
fn default_red_interval() -> u64 {
    60
}
fn default_orange_interval() -> u64 {
    1800
}
fn default_yellow_interval() -> u64 {
    86_400
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            urgent_interval_secs: default_urgent_interval(),
            red_interval_secs: default_red_interval(),
            orange_interval_secs: default_orange_interval(),
            yellow_interval_secs: default_yellow_interval(),
        }
    }
}

impl MonitorConfig {
    pub fn urgent_interval(&self) -> Duration {
        Duration::from_secs(self.urgent_interval_secs)
    }
    pub fn red_interval(&self) -> Duration {
        Duration::from_secs(self.red_interval_secs)
    }
    pub fn orange_interval(&self) -> Duration {
        Duration::from_secs(self.orange_interval_secs)
    }
    pub fn yellow_interval(&self) -> Duration {
        Duration::from_secs(self.yellow_interval_secs)
    }
}

/// Liquidation queue parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Check-queue cycle interval (seconds)
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,

    /// How long a candidate may sit in `processing` before the cycle
    /// reverts it to `pending` (seconds)
    #[serde(default = "default_staleness_timeout")]
    pub staleness_timeout_secs: u64,

    /// Delay before re-checking an unprofitable (deferred) candidate
    #[serde(default = "default_defer_delay")]
    pub defer_delay_secs: u64,

    /// Minimum estimated profit to enroll as `pending` (ETH)
    #[serde(default = "default_min_profit")]
    pub min_profit_eth: f64,
}

fn default_check_interval() -> u64 {
    60
}
fn default_staleness_timeout() -> u64 {
    30 * 60
}
fn default_defer_delay() -> u64 {
    86_400
}
fn default_min_profit() -> f64 {
    0.0001
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval(),
            staleness_timeout_secs: default_staleness_timeout(),
            defer_delay_secs: default_defer_delay(),
            min_profit_eth: default_min_profit(),
        }
    }
}

impl QueueConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }
    pub fn staleness_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.staleness_timeout_secs as i64)
    }
    pub fn defer_delay(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.defer_delay_secs as i64)
    }
}

/// Event ingestion parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestorConfig {
    /// Poll interval between head checks (seconds)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Confirmation depth before a block is processed
    #[serde(default = "default_confirmations")]
    pub confirmations: u64,

    /// Blocks per backfill range fetch
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,

    /// Concurrent range fetches during backfill
    #[serde(default = "default_backfill_concurrency")]
    pub backfill_concurrency: usize,
}

fn default_poll_interval() -> u64 {
    13
}
fn default_confirmations() -> u64 {
    4
}
fn default_chunk_size() -> u64 {
    1000
}
fn default_backfill_concurrency() -> usize {
    2
}

impl Default for IngestorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            confirmations: default_confirmations(),
            chunk_size: default_chunk_size(),
            backfill_concurrency: default_backfill_concurrency(),
        }
    }
}

impl IngestorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// One network's deployment addresses, seeded at startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkSeed {
    /// Network identifier (e.g. "eth", "gnosis")
    pub id: String,

    /// Primary RPC endpoint; a network without one is seeded inactive
    #[serde(default)]
    pub rpc_url: Option<String>,

    /// Secondary endpoint for reserve-liquidity reads
    #[serde(default)]
    pub reserve_rpc_url: Option<String>,

    /// LendingPoolAddressesProvider registry contract
    pub addresses_provider: String,

    /// ProtocolDataProvider contract
    pub data_provider: String,

    /// Swap router used to convert to/from the reserve asset
    #[serde(default)]
    pub swap_router: Option<String>,

    /// The asset the bot holds funds in between operations
    pub reserve_token: String,

    /// Flash-loan liquidation adapter (receiver) contract
    #[serde(default)]
    pub flash_loan_adapter: Option<String>,

    /// Block the protocol was deployed at; backfill starts here
    #[serde(default)]
    pub deploy_block: Option<u64>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            profile: default_profile_name(),
            zones: ZoneConfig::default(),
            monitor: MonitorConfig::default(),
            queue: QueueConfig::default(),
            ingestor: IngestorConfig::default(),
            database_url: default_database_url(),
            networks: Vec::new(),
        }
    }
}

impl BotConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Create a testing profile: short timers, no profit floor.
    pub fn testing() -> Self {
        Self {
            profile: "testing".to_string(),
            monitor: MonitorConfig {
                urgent_interval_secs: 5,
                red_interval_secs: 5,
                orange_interval_secs: 30,
                yellow_interval_secs: 60,
            },
            queue: QueueConfig {
                check_interval_secs: 5,
                staleness_timeout_secs: 60,
                defer_delay_secs: 5,
                min_profit_eth: 0.0,
            },
            ingestor: IngestorConfig {
                poll_interval_secs: 1,
                confirmations: 1,
                chunk_size: 1000,
                backfill_concurrency: 2,
            },
            database_url: "sqlite::memory:".to_string(),
            ..Self::default()
        }
    }

    /// Profile from the BOT_PROFILE environment variable: `testing`, a
    /// path to a TOML file, or the defaults.
    pub fn from_env() -> Self {
        let profile = std::env::var("BOT_PROFILE").unwrap_or_else(|_| "default".to_string());
        match profile.to_lowercase().as_str() {
            "testing" | "test" => Self::testing(),
            "default" => Self::default(),
            path => Self::from_file(path).unwrap_or_else(|e| {
                tracing::warn!(error = %e, profile = path, "Failed to load config file, using defaults");
                Self::default()
            }),
        }
    }

    /// Log the current configuration.
    pub fn log_config(&self) {
        tracing::info!(profile = %self.profile, networks = self.networks.len(), "Bot configuration loaded");
        tracing::info!(
            red = self.zones.red_threshold,
            orange = self.zones.orange_threshold,
            "Zone thresholds"
        );
        tracing::info!(
            urgent_secs = self.monitor.urgent_interval_secs,
            red_secs = self.monitor.red_interval_secs,
            orange_secs = self.monitor.orange_interval_secs,
            yellow_secs = self.monitor.yellow_interval_secs,
            "Monitor cadences"
        );
        tracing::info!(
            check_secs = self.queue.check_interval_secs,
            staleness_secs = self.queue.staleness_timeout_secs,
            defer_secs = self.queue.defer_delay_secs,
            min_profit_eth = self.queue.min_profit_eth,
            "Queue parameters"
        );
        tracing::info!(
            poll_secs = self.ingestor.poll_interval_secs,
            confirmations = self.ingestor.confirmations,
            chunk_size = self.ingestor.chunk_size,
            backfill_concurrency = self.ingestor.backfill_concurrency,
            "Ingestor parameters"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BotConfig::default();
        assert_eq!(config.zones.red_threshold, 1.1);
        assert_eq!(config.zones.orange_threshold, 1.5);
        assert_eq!(config.queue.defer_delay_secs, 86_400);
        assert_eq!(config.queue.staleness_timeout_secs, 1800);
    }

    #[test]
    fn test_testing_profile() {
        let config = BotConfig::testing();
        assert_eq!(config.profile, "testing");
        assert!(config.queue.defer_delay_secs < 60);
        assert_eq!(config.queue.min_profit_eth, 0.0);
    }

    #[test]
    fn test_toml_round_trip() {
        let toml_str = r#"
            profile = "custom"

            [zones]
            red_threshold = 1.2

            [[networks]]
            id = "eth"
            rpc_url = "http://127.0.0.1:8545/"
            addresses_provider = "0xc6f769A0c46cFFa57d91E87ED3Bc0cd338Ce6361"
            data_provider = "0x8F5273c5aa638e946BC5dD2171Ae9E9184C75228"
            reserve_token = "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2"
            deploy_block = 13339692
        "#;
        let config: BotConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.profile, "custom");
        assert_eq!(config.zones.red_threshold, 1.2);
        // Untouched sections keep their defaults.
        assert_eq!(config.zones.orange_threshold, 1.5);
        assert_eq!(config.networks.len(), 1);
        assert_eq!(config.networks[0].id, "eth");
        assert_eq!(config.networks[0].deploy_block, Some(13_339_692));
        assert!(config.networks[0].swap_router.is_none());
    }
}
