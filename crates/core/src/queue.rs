//! Liquidation queue state machine.
//!
//! Candidates move `pending -> processing -> liquidated`, detour through
//! `deferred` while unprofitable, and exit through `cancelled` when the
//! position recovers or the opportunity disappears. A fixed-interval check
//! cycle reconciles open candidates, picks the most profitable pending one
//! and dispatches execution; a staleness timeout recovers candidates whose
//! worker died mid-flight. Rows are never hard-deleted.

use std::sync::Arc;

use alloy::primitives::{I256, U256};
use anyhow::Result;
use chrono::Utc;
use tokio::time::interval;
use tracing::{error, info, warn};
use vigil_store::{CandidateRecord, CandidateStatus, Store, UserAccountRecord};

use crate::config::QueueConfig;
use crate::executor::ExecutionDriver;
use crate::recheck::RecheckScheduler;
use crate::tracker::PositionTracker;
use crate::wad_math::{eth_f64_to_wei, parse_wei_signed, to_signed};

/// Enrollment and candidate bookkeeping. The position tracker is the only
/// caller of [`LiquidationQueue::enroll`].
pub struct LiquidationQueue {
    store: Store,
    driver: Arc<ExecutionDriver>,
    recheck: Arc<RecheckScheduler>,
    cfg: QueueConfig,
    min_profit_wei: U256,
}

impl LiquidationQueue {
    pub fn new(
        store: Store,
        driver: Arc<ExecutionDriver>,
        recheck: Arc<RecheckScheduler>,
        cfg: QueueConfig,
    ) -> Self {
        let min_profit_wei = eth_f64_to_wei(cfg.min_profit_eth);
        Self {
            store,
            driver,
            recheck,
            cfg,
            min_profit_wei,
        }
    }

    /// Re-estimate the user's opportunity and create, re-price or cancel
    /// their candidate accordingly.
    pub async fn enroll(&self, user: &UserAccountRecord) -> Result<()> {
        match self.driver.estimate(&user.address, &user.network_id).await? {
            None => {
                // Position improved or was liquidated by a third party.
                if self.store.cancel_active_candidate(user.id).await? {
                    info!(
                        user = %user.address,
                        network = %user.network_id,
                        "No opportunity left, candidate cancelled"
                    );
                }
                Ok(())
            }
            Some(estimate) => {
                let profit = estimate.estimated_profit_eth();
                let profitable = profit >= to_signed(self.min_profit_wei);
                self.apply_enrollment(user, &profit.to_string(), profitable)
                    .await?;
                Ok(())
            }
        }
    }

    /// Persist an enrollment decision: `pending` when profitable now,
    /// otherwise `deferred` with a one-shot re-check at the deadline.
    pub async fn apply_enrollment(
        &self,
        user: &UserAccountRecord,
        estimated_profit_eth: &str,
        profitable: bool,
    ) -> Result<CandidateRecord> {
        if profitable {
            let candidate = self
                .store
                .upsert_candidate(user.id, CandidateStatus::Pending, estimated_profit_eth, None)
                .await?;
            info!(
                user = %user.address,
                network = %user.network_id,
                estimated_profit_eth = %estimated_profit_eth,
                "Liquidation candidate pending"
            );
            Ok(candidate)
        } else {
            let recheck_at = Utc::now() + self.cfg.defer_delay();
            let candidate = self
                .store
                .upsert_candidate(
                    user.id,
                    CandidateStatus::Deferred,
                    estimated_profit_eth,
                    Some(recheck_at),
                )
                .await?;
            self.recheck
                .schedule(&user.address, &user.network_id, recheck_at);
            info!(
                user = %user.address,
                network = %user.network_id,
                estimated_profit_eth = %estimated_profit_eth,
                recheck_at = %recheck_at,
                "Below profit floor, candidate deferred"
            );
            Ok(candidate)
        }
    }
}

/// Pick the pending candidate with the highest estimated profit. Input
/// arrives in creation order and only a strictly greater profit replaces
/// the running best, so the earliest-created candidate wins ties.
pub fn select_best(pending: Vec<CandidateRecord>) -> Option<CandidateRecord> {
    let mut best: Option<(I256, CandidateRecord)> = None;
    for candidate in pending {
        let profit =
            parse_wei_signed(&candidate.estimated_profit_eth).unwrap_or(I256::MIN);
        let is_better = match &best {
            Some((best_profit, _)) => profit > *best_profit,
            None => true,
        };
        if is_better {
            best = Some((profit, candidate));
        }
    }
    best.map(|(_, candidate)| candidate)
}

/// The periodic check-queue cycle.
pub struct QueueWorker {
    store: Store,
    tracker: Arc<PositionTracker>,
    driver: Arc<ExecutionDriver>,
    cfg: QueueConfig,
}

impl QueueWorker {
    pub fn new(
        store: Store,
        tracker: Arc<PositionTracker>,
        driver: Arc<ExecutionDriver>,
        cfg: QueueConfig,
    ) -> Self {
        Self {
            store,
            tracker,
            driver,
            cfg,
        }
    }

    /// Run the check cycle forever.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = interval(self.cfg.check_interval());
        loop {
            ticker.tick().await;
            if let Err(e) = Arc::clone(&self).check_queue().await {
                error!(error = %e, "Check-queue cycle failed");
            }
        }
    }

    /// One check-cycle pass: recover stale executions, reconcile open
    /// candidates, then dispatch the best pending one.
    pub async fn check_queue(self: Arc<Self>) -> Result<()> {
        if let Some(current) = self.store.processing_candidate().await? {
            if Utc::now() - current.updated_at > self.cfg.staleness_timeout() {
                self.store
                    .set_candidate_status(
                        current.id,
                        CandidateStatus::Pending,
                        Some("liquidation time is up"),
                    )
                    .await?;
                error!(
                    user = %current.address,
                    network = %current.network_id,
                    since = %current.updated_at,
                    "Liquidation exceeded the staleness timeout, returned to pending"
                );
            }
            // Never run two executions at once.
            return Ok(());
        }

        // Parameters may have drifted since enrollment; each refresh
        // re-prices, re-defers or cancels its candidate.
        for candidate in self.store.open_candidates().await? {
            if let Err(e) = self
                .tracker
                .refresh(&candidate.address, &candidate.network_id)
                .await
            {
                warn!(
                    user = %candidate.address,
                    network = %candidate.network_id,
                    error = %e,
                    "Reconciliation refresh failed"
                );
            }
        }

        let pending = self.store.pending_candidates().await?;
        let Some(best) = select_best(pending) else {
            return Ok(());
        };

        self.store
            .set_candidate_status(best.id, CandidateStatus::Processing, None)
            .await?;
        info!(
            user = %best.address,
            network = %best.network_id,
            estimated_profit_eth = %best.estimated_profit_eth,
            "Dispatching liquidation"
        );

        let worker = Arc::clone(&self);
        tokio::spawn(async move {
            worker.dispatch(best).await;
        });
        Ok(())
    }

    /// Execute one candidate and record the outcome. A failed execution
    /// goes back to `pending`; it never reports `liquidated`.
    async fn dispatch(&self, candidate: CandidateRecord) {
        match self
            .driver
            .execute(&candidate.address, &candidate.network_id)
            .await
        {
            Ok(fact_profit_eth) => {
                if let Err(e) = self
                    .store
                    .mark_liquidated(candidate.id, &fact_profit_eth)
                    .await
                {
                    error!(
                        user = %candidate.address,
                        network = %candidate.network_id,
                        error = %e,
                        "Failed to record completed liquidation"
                    );
                    return;
                }
                info!(
                    user = %candidate.address,
                    network = %candidate.network_id,
                    fact_profit_eth = %fact_profit_eth,
                    "Liquidation completed"
                );
                // The position changed; re-derive its state.
                if let Err(e) = self
                    .tracker
                    .refresh(&candidate.address, &candidate.network_id)
                    .await
                {
                    warn!(
                        user = %candidate.address,
                        network = %candidate.network_id,
                        error = %e,
                        "Post-liquidation refresh failed"
                    );
                }
            }
            Err(e) => {
                warn!(
                    user = %candidate.address,
                    network = %candidate.network_id,
                    error = %e,
                    "Liquidation failed, returned to pending"
                );
                if let Err(e) = self
                    .store
                    .set_candidate_status(
                        candidate.id,
                        CandidateStatus::Pending,
                        Some(&e.to_string()),
                    )
                    .await
                {
                    error!(
                        user = %candidate.address,
                        network = %candidate.network_id,
                        error = %e,
                        "Failed to return candidate to pending"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::collections::HashMap;
    use vigil_store::NetworkRecord;

    use crate::config::ZoneConfig;

    async fn test_store() -> Store {
        let store = Store::in_memory().await.unwrap();
        store.init_schema().await.unwrap();
        store
            .upsert_network(&NetworkRecord {
                id: "eth".into(),
                rpc_url: None,
                reserve_rpc_url: None,
                balance: "0".into(),
                is_active: true,
            })
            .await
            .unwrap();
        store
    }

    async fn seed_user(store: &Store, address: &str, hf: f64) -> UserAccountRecord {
        store
            .upsert_user_account(&vigil_store::NewUserAccount {
                address: address.to_string(),
                network_id: "eth".into(),
                total_collateral_eth: "10000000000000000000".into(),
                total_debt_eth: "9000000000000000000".into(),
                available_borrows_eth: "0".into(),
                current_liquidation_threshold: "8500".into(),
                ltv: "8000".into(),
                health_factor: hf,
            })
            .await
            .unwrap();
        store.user_account(address, "eth").await.unwrap()
    }

    fn queue_parts(store: Store, cfg: QueueConfig) -> (Arc<LiquidationQueue>, Arc<QueueWorker>) {
        // An empty network map: these tests never reach the chain.
        let chains = Arc::new(HashMap::new());
        let driver = Arc::new(ExecutionDriver::new(store.clone(), Arc::clone(&chains)));
        let (recheck, _rx) = RecheckScheduler::new();
        let queue = Arc::new(LiquidationQueue::new(
            store.clone(),
            Arc::clone(&driver),
            Arc::clone(&recheck),
            cfg.clone(),
        ));
        let tracker = Arc::new(PositionTracker::new(
            store.clone(),
            chains,
            Arc::clone(&queue),
            recheck,
            ZoneConfig::default(),
        ));
        let worker = Arc::new(QueueWorker::new(store, tracker, driver, cfg));
        (queue, worker)
    }

    fn candidate_row(id: i64, created_secs_ago: i64, profit: &str) -> CandidateRecord {
        let now = Utc::now();
        CandidateRecord {
            id,
            user_id: id,
            status: CandidateStatus::Pending,
            estimated_profit_eth: profit.to_string(),
            fact_profit_eth: None,
            to_update_date: None,
            error: None,
            created_at: now - Duration::seconds(created_secs_ago),
            updated_at: now,
            address: format!("0x{id}"),
            network_id: "eth".into(),
        }
    }

    #[test]
    fn test_select_best_by_profit() {
        let pending = vec![
            candidate_row(1, 30, "100"),
            candidate_row(2, 20, "300"),
            candidate_row(3, 10, "200"),
        ];
        assert_eq!(select_best(pending).unwrap().id, 2);
    }

    #[test]
    fn test_select_best_tie_breaks_on_creation_time() {
        // Rows arrive ordered by created_at; equal profit keeps the first.
        let pending = vec![
            candidate_row(1, 30, "500"),
            candidate_row(2, 20, "500"),
        ];
        assert_eq!(select_best(pending).unwrap().id, 1);
    }

    #[test]
    fn test_select_best_handles_negative_profit() {
        let pending = vec![candidate_row(1, 10, "-100"), candidate_row(2, 5, "-5")];
        assert_eq!(select_best(pending).unwrap().id, 2);
        assert!(select_best(vec![]).is_none());
    }

    #[tokio::test]
    async fn test_stale_processing_reverts_to_pending() {
        let store = test_store().await;
        let user = seed_user(&store, "0xa", 0.9).await;
        let (queue, worker) = queue_parts(store.clone(), QueueConfig::default());

        let candidate = queue.apply_enrollment(&user, "100", true).await.unwrap();
        store
            .set_candidate_status(candidate.id, CandidateStatus::Processing, None)
            .await
            .unwrap();
        store
            .backdate_candidate(candidate.id, Utc::now() - Duration::minutes(31))
            .await
            .unwrap();

        Arc::clone(&worker).check_queue().await.unwrap();

        let candidates = store.pending_candidates().await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].status, CandidateStatus::Pending);
        assert_eq!(candidates[0].error.as_deref(), Some("liquidation time is up"));
    }

    #[tokio::test]
    async fn test_fresh_processing_blocks_the_cycle() {
        let store = test_store().await;
        let user = seed_user(&store, "0xa", 0.9).await;
        let (queue, worker) = queue_parts(store.clone(), QueueConfig::default());

        let candidate = queue.apply_enrollment(&user, "100", true).await.unwrap();
        store
            .set_candidate_status(candidate.id, CandidateStatus::Processing, None)
            .await
            .unwrap();

        Arc::clone(&worker).check_queue().await.unwrap();

        let processing = store.processing_candidate().await.unwrap().unwrap();
        assert_eq!(processing.id, candidate.id);
    }

    #[tokio::test]
    async fn test_candidate_lifecycle() {
        let store = test_store().await;
        let user = seed_user(&store, "0xa", 0.9).await;
        let (queue, _worker) = queue_parts(store.clone(), QueueConfig::default());

        // Positive estimate below the profit floor: deferred ~24h out.
        let candidate = queue
            .apply_enrollment(&user, "50000000000000", false)
            .await
            .unwrap();
        assert_eq!(candidate.status, CandidateStatus::Deferred);
        let recheck_at = candidate.to_update_date.unwrap();
        let expected = Utc::now() + Duration::seconds(86_400);
        assert!((recheck_at - expected).num_seconds().abs() < 5);

        // Market moved: the re-estimate clears the floor, same row flips
        // to pending.
        let repriced = queue
            .apply_enrollment(&user, "200000000000000", true)
            .await
            .unwrap();
        assert_eq!(repriced.id, candidate.id);
        assert_eq!(repriced.status, CandidateStatus::Pending);

        // Dispatch and complete.
        let best = select_best(store.pending_candidates().await.unwrap()).unwrap();
        store
            .set_candidate_status(best.id, CandidateStatus::Processing, None)
            .await
            .unwrap();
        store
            .mark_liquidated(best.id, "180000000000000")
            .await
            .unwrap();

        assert!(store.active_candidate(user.id).await.unwrap().is_none());
    }
}
