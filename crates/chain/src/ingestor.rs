//! Confirmed pool-event ingestion with historical backfill.
//!
//! Per listener, a polling loop fetches logs up to `head - confirmations`,
//! decodes them with the typed event bindings (the affected user is read
//! from each event's own field, never by duck-typed name lookup) and emits
//! one [`ConfirmedBatch`] per advance on an mpsc channel. The consumer
//! refreshes every user in the batch and only then persists the cursor, so
//! a crash replays rather than skips blocks.
//!
//! Startup catch-up fetches block ranges with bounded concurrency; results
//! are merged in range order, not completion order, before user
//! extraction.

use alloy::primitives::{Address, U256};
use alloy::providers::Provider;
use alloy::rpc::types::{Filter, Log};
use alloy::sol_types::SolEvent;
use anyhow::{Context, Result};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::contracts::ILendingPool::{Borrow, Deposit, LiquidationCall, Repay, Withdraw};
use crate::provider::NetworkProvider;

/// A decoded lending-pool event.
#[derive(Debug, Clone)]
pub enum PoolEvent {
    Deposit {
        reserve: Address,
        user: Address,
        amount: U256,
        block_number: u64,
    },
    Withdraw {
        reserve: Address,
        user: Address,
        amount: U256,
        block_number: u64,
    },
    Borrow {
        reserve: Address,
        user: Address,
        amount: U256,
        block_number: u64,
    },
    Repay {
        reserve: Address,
        user: Address,
        amount: U256,
        block_number: u64,
    },
    LiquidationCall {
        collateral_asset: Address,
        debt_asset: Address,
        user: Address,
        debt_to_cover: U256,
        block_number: u64,
    },
}

impl PoolEvent {
    /// The borrower whose position this event may have moved.
    pub fn user(&self) -> Address {
        match self {
            Self::Deposit { user, .. }
            | Self::Withdraw { user, .. }
            | Self::Borrow { user, .. }
            | Self::Repay { user, .. }
            | Self::LiquidationCall { user, .. } => *user,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Deposit { .. } => "Deposit",
            Self::Withdraw { .. } => "Withdraw",
            Self::Borrow { .. } => "Borrow",
            Self::Repay { .. } => "Repay",
            Self::LiquidationCall { .. } => "LiquidationCall",
        }
    }

    pub fn block_number(&self) -> u64 {
        match self {
            Self::Deposit { block_number, .. }
            | Self::Withdraw { block_number, .. }
            | Self::Borrow { block_number, .. }
            | Self::Repay { block_number, .. }
            | Self::LiquidationCall { block_number, .. } => *block_number,
        }
    }
}

/// Decode one log against the pool's event signatures.
pub fn decode_pool_event(log: &Log) -> Option<PoolEvent> {
    let block_number = log.block_number.unwrap_or(0);
    let topic0 = *log.topics().first()?;

    if topic0 == Deposit::SIGNATURE_HASH {
        let event = Deposit::decode_log(&log.inner, true).ok()?;
        Some(PoolEvent::Deposit {
            reserve: event.data.reserve,
            user: event.data.user,
            amount: event.data.amount,
            block_number,
        })
    } else if topic0 == Withdraw::SIGNATURE_HASH {
        let event = Withdraw::decode_log(&log.inner, true).ok()?;
        Some(PoolEvent::Withdraw {
            reserve: event.data.reserve,
            user: event.data.user,
            amount: event.data.amount,
            block_number,
        })
    } else if topic0 == Borrow::SIGNATURE_HASH {
        let event = Borrow::decode_log(&log.inner, true).ok()?;
        Some(PoolEvent::Borrow {
            reserve: event.data.reserve,
            user: event.data.user,
            amount: event.data.amount,
            block_number,
        })
    } else if topic0 == Repay::SIGNATURE_HASH {
        let event = Repay::decode_log(&log.inner, true).ok()?;
        Some(PoolEvent::Repay {
            reserve: event.data.reserve,
            user: event.data.user,
            amount: event.data.amount,
            block_number,
        })
    } else if topic0 == LiquidationCall::SIGNATURE_HASH {
        let event = LiquidationCall::decode_log(&log.inner, true).ok()?;
        Some(PoolEvent::LiquidationCall {
            collateral_asset: event.data.collateralAsset,
            debt_asset: event.data.debtAsset,
            user: event.data.user,
            debt_to_cover: event.data.debtToCover,
            block_number,
        })
    } else {
        None
    }
}

/// Affected users in first-seen order, deduplicated.
pub fn extract_users(events: &[PoolEvent]) -> Vec<Address> {
    let mut users = Vec::new();
    for event in events {
        let user = event.user();
        if !users.contains(&user) {
            users.push(user);
        }
    }
    users
}

/// Split `[from, to]` into inclusive ranges of at most `chunk` blocks.
pub fn block_ranges(from: u64, to: u64, chunk: u64) -> Vec<(u64, u64)> {
    let mut ranges = Vec::new();
    if from > to || chunk == 0 {
        return ranges;
    }
    let mut start = from;
    while start <= to {
        let end = std::cmp::min(start + chunk - 1, to);
        ranges.push((start, end));
        start = end + 1;
    }
    ranges
}

/// One confirmed advance of the cursor: every affected user between the
/// previous cursor and `block_number` inclusive.
#[derive(Debug, Clone)]
pub struct ConfirmedBatch {
    pub block_number: u64,
    pub users: Vec<Address>,
}

pub struct EventIngestor {
    network: String,
    provider: NetworkProvider,
    contract: Address,
    poll_interval: Duration,
    confirmations: u64,
    chunk_size: u64,
    backfill_concurrency: usize,
}

impl EventIngestor {
    pub fn new(
        provider: NetworkProvider,
        contract: Address,
        poll_interval: Duration,
        confirmations: u64,
        chunk_size: u64,
        backfill_concurrency: usize,
    ) -> Self {
        Self {
            network: provider.network.clone(),
            provider,
            contract,
            poll_interval,
            confirmations,
            chunk_size,
            backfill_concurrency,
        }
    }

    /// Start polling. `last_block` is the resumable cursor: ingestion
    /// begins at the following block. Batches arrive on the returned
    /// channel; `recv().await` is the blocking consume operation.
    pub fn start(self, last_block: Option<u64>) -> (mpsc::Receiver<ConfirmedBatch>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(8);
        let handle = tokio::spawn(async move {
            self.run(tx, last_block).await;
        });
        (rx, handle)
    }

    async fn run(self, tx: mpsc::Sender<ConfirmedBatch>, last_block: Option<u64>) {
        info!(
            network = %self.network,
            contract = %self.contract,
            from_block = ?last_block,
            confirmations = self.confirmations,
            "Event ingestion started"
        );

        let mut cursor = last_block;
        loop {
            match self.advance(cursor).await {
                Ok(Some(batch)) => {
                    let block_number = batch.block_number;
                    if tx.send(batch).await.is_err() {
                        // Consumer gone; shut the loop down.
                        return;
                    }
                    cursor = Some(block_number);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(
                        network = %self.network,
                        error = %e,
                        "Event poll failed, retrying next cycle"
                    );
                }
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Fetch everything between the cursor and the confirmed head, if the
    /// chain advanced.
    async fn advance(&self, cursor: Option<u64>) -> Result<Option<ConfirmedBatch>> {
        let head = self.provider.block_number().await?;
        let target = head.saturating_sub(self.confirmations);
        let from = cursor.map(|c| c + 1).unwrap_or(target);
        if target < from {
            return Ok(None);
        }

        let events = self.fetch_events(from, target).await?;
        let users = extract_users(&events);
        debug!(
            network = %self.network,
            from,
            to = target,
            events = events.len(),
            users = users.len(),
            "Confirmed blocks processed"
        );

        Ok(Some(ConfirmedBatch {
            block_number: target,
            users,
        }))
    }

    /// Chunked, bounded-concurrency log fetch over `[from, to]`, merged in
    /// range order.
    async fn fetch_events(&self, from: u64, to: u64) -> Result<Vec<PoolEvent>> {
        let ranges = block_ranges(from, to, self.chunk_size);
        if ranges.len() > 1 {
            info!(
                network = %self.network,
                from,
                to,
                ranges = ranges.len(),
                "Catching up on historical events"
            );
        }

        let per_range: Vec<Vec<Log>> = stream::iter(ranges)
            .map(|(start, end)| self.fetch_range(start, end))
            .buffered(self.backfill_concurrency)
            .try_collect()
            .await?;

        Ok(per_range
            .into_iter()
            .flatten()
            .filter_map(|log| decode_pool_event(&log))
            .collect())
    }

    async fn fetch_range(&self, from: u64, to: u64) -> Result<Vec<Log>> {
        let filter = Filter::new()
            .address(self.contract)
            .from_block(from)
            .to_block(to);
        let http = self.provider.http()?;
        http.get_logs(&filter)
            .await
            .with_context(|| format!("get_logs [{from}, {to}] on {}", self.network))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Log as PrimitiveLog, U256};

    fn rpc_log(address: Address, data: alloy::primitives::LogData, block: u64) -> Log {
        Log {
            inner: PrimitiveLog { address, data },
            block_hash: None,
            block_number: Some(block),
            block_timestamp: None,
            transaction_hash: None,
            transaction_index: None,
            log_index: None,
            removed: false,
        }
    }

    #[test]
    fn test_block_ranges() {
        assert_eq!(block_ranges(1, 10, 4), vec![(1, 4), (5, 8), (9, 10)]);
        assert_eq!(block_ranges(5, 5, 1000), vec![(5, 5)]);
        assert!(block_ranges(10, 5, 1000).is_empty());
        assert!(block_ranges(1, 10, 0).is_empty());
    }

    #[test]
    fn test_decode_borrow_event() {
        let pool = Address::repeat_byte(0x11);
        let event = Borrow {
            reserve: Address::repeat_byte(0x22),
            user: Address::repeat_byte(0x33),
            onBehalfOf: Address::repeat_byte(0x44),
            amount: U256::from(1_000u64),
            borrowRateMode: U256::from(2u8),
            borrowRate: U256::from(0u8),
            referral: 0,
        };
        let log = rpc_log(pool, event.encode_log_data(), 42);

        match decode_pool_event(&log).unwrap() {
            PoolEvent::Borrow {
                reserve,
                user,
                amount,
                block_number,
            } => {
                assert_eq!(reserve, Address::repeat_byte(0x22));
                assert_eq!(user, Address::repeat_byte(0x33));
                assert_eq!(amount, U256::from(1_000u64));
                assert_eq!(block_number, 42);
            }
            other => panic!("decoded the wrong event: {other:?}"),
        }
    }

    #[test]
    fn test_decode_liquidation_event() {
        let event = LiquidationCall {
            collateralAsset: Address::repeat_byte(0x22),
            debtAsset: Address::repeat_byte(0x33),
            user: Address::repeat_byte(0x44),
            debtToCover: U256::from(2_500u64),
            liquidatedCollateralAmount: U256::from(100u64),
            liquidator: Address::repeat_byte(0x55),
            receiveAToken: false,
        };
        let log = rpc_log(Address::repeat_byte(0x11), event.encode_log_data(), 7);

        let decoded = decode_pool_event(&log).unwrap();
        assert_eq!(decoded.user(), Address::repeat_byte(0x44));
        assert_eq!(decoded.event_type(), "LiquidationCall");
        assert_eq!(decoded.block_number(), 7);
    }

    #[test]
    fn test_unknown_event_is_skipped() {
        let data = alloy::primitives::LogData::new_unchecked(
            vec![alloy::primitives::B256::repeat_byte(0xab)],
            Default::default(),
        );
        let log = rpc_log(Address::repeat_byte(0x11), data, 1);
        assert!(decode_pool_event(&log).is_none());
    }

    #[test]
    fn test_extract_users_dedupes_in_order() {
        let user_a = Address::repeat_byte(0xaa);
        let user_b = Address::repeat_byte(0xbb);
        let events = vec![
            PoolEvent::Deposit {
                reserve: Address::ZERO,
                user: user_a,
                amount: U256::from(1u8),
                block_number: 1,
            },
            PoolEvent::Borrow {
                reserve: Address::ZERO,
                user: user_b,
                amount: U256::from(2u8),
                block_number: 2,
            },
            PoolEvent::Repay {
                reserve: Address::ZERO,
                user: user_a,
                amount: U256::from(3u8),
                block_number: 3,
            },
        ];
        assert_eq!(extract_users(&events), vec![user_a, user_b]);
    }
}
