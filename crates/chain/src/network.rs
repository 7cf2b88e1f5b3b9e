//! Per-network deployment handles.
//!
//! Everything one network exposes to the rest of the system lives behind a
//! [`NetworkHandle`], built once at startup from the seeded configuration
//! and shared read-only by every worker. No call site populates network
//! state lazily.

use std::collections::HashMap;
use std::sync::Arc;

use alloy::primitives::{Address, U256};
use alloy::sol_types::SolCall;
use anyhow::{Context, Result};

use crate::contracts::IERC20;
use crate::lending_pool::LendingPool;
use crate::provider::NetworkProvider;
use crate::signer::{TransactionSender, TxOutcome};
use crate::swap::SwapRouter;

const APPROVE_GAS_LIMIT: u64 = 80_000;

/// Canonical database key for a contract address (lowercase hex).
pub fn address_key(address: Address) -> String {
    format!("{address:#x}")
}

/// One network's providers, contracts and signer.
pub struct NetworkHandle {
    pub network: String,
    pub provider: NetworkProvider,
    pub pool: LendingPool,
    /// Absent on networks without a deployed router; swap legs fail there.
    pub swap: Option<SwapRouter>,
    pub sender: Arc<TransactionSender>,
    /// The asset the bot holds funds in between operations.
    pub reserve_token: Address,
    /// Flash-loan liquidation adapter; absent disables the flash path.
    pub flash_loan_adapter: Option<Address>,
}

/// All configured networks, keyed by identifier.
pub type NetworkMap = HashMap<String, Arc<NetworkHandle>>;

impl NetworkHandle {
    /// ERC-20 balance over the primary endpoint.
    pub async fn erc20_balance(&self, token: Address, owner: Address) -> Result<U256> {
        let http = self.provider.http()?;
        let balance = IERC20::new(token, &http)
            .balanceOf(owner)
            .call()
            .await
            .with_context(|| format!("balanceOf({owner}) of {token} on {}", self.network))?;
        Ok(balance._0)
    }

    /// Protocol-wide liquidity of a reserve: the underlying balance held by
    /// its interest-bearing wrapper, read over the reserve-liquidity
    /// endpoint.
    pub async fn reserve_liquidity(&self, token: Address, a_token: Address) -> Result<U256> {
        let http = self.provider.reserve_http()?;
        let balance = IERC20::new(token, &http)
            .balanceOf(a_token)
            .call()
            .await
            .with_context(|| format!("reserve liquidity of {token} on {}", self.network))?;
        Ok(balance._0)
    }

    /// Approve `spender` to pull `amount` of `token` from the bot wallet.
    pub async fn approve(
        &self,
        token: Address,
        spender: Address,
        amount: U256,
        gas_price: U256,
    ) -> Result<TxOutcome> {
        let calldata = IERC20::approveCall { spender, amount }.abi_encode();
        self.sender
            .send(token, calldata.into(), APPROVE_GAS_LIMIT, gas_price)
            .await
            .with_context(|| format!("approve({spender}) of {token} on {}", self.network))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_key_is_lowercase_hex() {
        let address: Address = "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"
            .parse()
            .unwrap();
        assert_eq!(
            address_key(address),
            "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2"
        );
        // Round-trips back through the parser.
        assert_eq!(address_key(address).parse::<Address>().unwrap(), address);
    }
}
