//! Position tracker: the single write path for borrower state.
//!
//! Every re-scan trigger (zone monitor, event ingestor, deferred re-check,
//! queue reconciliation) funnels through [`PositionTracker::refresh`], which
//! re-reads on-chain account data, upserts the borrower row and drives
//! liquidation-queue enrollment or cancellation from the fresh health
//! factor. Concurrent refreshes for the same user race harmlessly: each one
//! writes values computed from its own chain read.

use std::sync::Arc;

use alloy::primitives::{Address, U256};
use anyhow::{Context, Result};
use tracing::{info, warn};
use vigil_chain::NetworkMap;
use vigil_store::{NewUserAccount, Store, UserAccountRecord, HF_NO_DEBT};

use crate::config::ZoneConfig;
use crate::queue::LiquidationQueue;
use crate::recheck::RecheckScheduler;
use crate::wad_math::{wei_to_eth_f64, HF_INFINITY};
use crate::zone::Zone;

/// Map the protocol's max-uint "infinite health" sentinel to the stored
/// `-1` sentinel; everything else truncates to two decimals.
pub fn normalize_health_factor(raw: U256) -> f64 {
    if raw == HF_INFINITY {
        return HF_NO_DEBT;
    }
    (wei_to_eth_f64(raw) * 100.0).floor() / 100.0
}

pub struct PositionTracker {
    store: Store,
    chains: Arc<NetworkMap>,
    queue: Arc<LiquidationQueue>,
    recheck: Arc<RecheckScheduler>,
    zones: ZoneConfig,
}

impl PositionTracker {
    pub fn new(
        store: Store,
        chains: Arc<NetworkMap>,
        queue: Arc<LiquidationQueue>,
        recheck: Arc<RecheckScheduler>,
        zones: ZoneConfig,
    ) -> Self {
        Self {
            store,
            chains,
            queue,
            recheck,
            zones,
        }
    }

    /// Re-read one borrower's account data and persist it.
    ///
    /// A health factor inside `(0, 1)` enrolls the user into the
    /// liquidation queue; any other value cancels a live candidate. On a
    /// chain read error the previous row is left untouched.
    pub async fn refresh(&self, address: &str, network: &str) -> Result<UserAccountRecord> {
        self.recheck.cancel(address, network);

        let handle = self
            .chains
            .get(network)
            .with_context(|| format!("network not configured: {network}"))?;
        let user: Address = address.parse().context("invalid user address")?;

        let data = match handle.pool.account_data(user).await {
            Ok(data) => data,
            Err(e) => {
                warn!(
                    user = %address,
                    network = %network,
                    error = %e,
                    "Failed to read account data, keeping previous state"
                );
                return Err(e);
            }
        };

        let hf = normalize_health_factor(data.health_factor);
        let prev_hf = self
            .store
            .user_account(address, network)
            .await
            .ok()
            .map(|u| u.health_factor);

        let user_id = self
            .store
            .upsert_user_account(&NewUserAccount {
                address: address.to_string(),
                network_id: network.to_string(),
                total_collateral_eth: data.total_collateral_eth.to_string(),
                total_debt_eth: data.total_debt_eth.to_string(),
                available_borrows_eth: data.available_borrows_eth.to_string(),
                current_liquidation_threshold: data.current_liquidation_threshold.to_string(),
                ltv: data.ltv.to_string(),
                health_factor: hf,
            })
            .await?;

        info!(
            user = %address,
            network = %network,
            hf,
            prev_hf = ?prev_hf,
            zone = %Zone::classify(hf, &self.zones),
            "Health factor updated"
        );

        let record = self.store.user_account(address, network).await?;

        if hf > 0.0 && hf < 1.0 {
            if let Err(e) = self.queue.enroll(&record).await {
                warn!(
                    user = %address,
                    network = %network,
                    error = %e,
                    "Liquidation queue enrollment failed"
                );
            }
        } else if self.store.cancel_active_candidate(user_id).await? {
            info!(
                user = %address,
                network = %network,
                hf,
                "Position recovered, liquidation candidate cancelled"
            );
        }

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_sentinel() {
        assert_eq!(normalize_health_factor(U256::MAX), HF_NO_DEBT);
    }

    #[test]
    fn test_normalize_truncates_to_two_decimals() {
        // 0.999999 => 0.99, never rounded up across the liquidation line.
        let raw = U256::from(999_999_000_000_000_000u128);
        assert_eq!(normalize_health_factor(raw), 0.99);

        let raw = U256::from(1_056_700_000_000_000_000u128);
        assert_eq!(normalize_health_factor(raw), 1.05);

        assert_eq!(normalize_health_factor(U256::ZERO), 0.0);
    }
}
