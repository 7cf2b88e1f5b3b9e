//! Chain interaction layer.
//!
//! This crate provides:
//! - Per-network provider handles (primary + reserve-liquidity endpoints)
//! - Typed contract bindings for the lending pool, addresses provider,
//!   protocol data provider, price oracle, ERC-20 and the swap router
//! - Confirmation-buffered pool-event ingestion with historical backfill
//! - Transaction signing and sending with receipt polling
//!
//! Supports multiple EVM networks, each injected as an explicit handle at
//! startup.

mod contracts;
mod ingestor;
mod lending_pool;
mod network;
mod provider;
mod signer;
mod swap;

pub use contracts::{
    IERC20, ILendingPool, ILendingPoolAddressesProvider, IPriceOracleGetter,
    IProtocolDataProvider, IUniswapV2Router,
};
pub use ingestor::{
    block_ranges, decode_pool_event, extract_users, ConfirmedBatch, EventIngestor, PoolEvent,
};
pub use lending_pool::{
    flash_liquidation_params, AccountData, LendingPool, ReserveConfiguration, ReserveToken,
    WrapperTokens,
};
pub use network::{address_key, NetworkHandle, NetworkMap};
pub use provider::NetworkProvider;
pub use signer::{TransactionSender, TxOutcome};
pub use swap::SwapRouter;
