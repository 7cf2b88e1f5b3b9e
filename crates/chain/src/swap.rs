//! Swap helper converting between arbitrary tokens and the reserve asset.
//!
//! Thin wrapper over a UniswapV2-style router, used as the price/liquidity
//! oracle for conversions: quote with `getAmounts{In,Out}`, execute with
//! the matching swap call. Paths are always direct pairs.

use alloy::primitives::{Address, U256};
use alloy::sol_types::SolCall;
use anyhow::{Context, Result};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

use crate::contracts::IUniswapV2Router;
use crate::provider::NetworkProvider;
use crate::signer::{TransactionSender, TxOutcome};

const SWAP_GAS_LIMIT: u64 = 200_000;

/// How long a submitted swap stays valid.
const SWAP_DEADLINE_SECS: u64 = 20 * 60;

#[derive(Debug, Clone)]
pub struct SwapRouter {
    network: String,
    provider: NetworkProvider,
    router: Address,
}

impl SwapRouter {
    pub fn new(provider: NetworkProvider, router: Address) -> Self {
        Self {
            network: provider.network.clone(),
            provider,
            router,
        }
    }

    /// The router contract address (the spender for swap approvals).
    pub fn address(&self) -> Address {
        self.router
    }

    fn deadline() -> U256 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        U256::from(now + SWAP_DEADLINE_SECS)
    }

    /// Input amount needed to receive exactly `amount_out`.
    pub async fn amounts_in(&self, amount_out: U256, from: Address, to: Address) -> Result<U256> {
        let http = self.provider.http()?;
        let amounts = IUniswapV2Router::new(self.router, &http)
            .getAmountsIn(amount_out, vec![from, to])
            .call()
            .await
            .with_context(|| format!("getAmountsIn on {}", self.network))?;
        amounts
            .amounts
            .first()
            .copied()
            .context("empty amounts from router")
    }

    /// Output amount received for spending exactly `amount_in`.
    pub async fn amounts_out(&self, amount_in: U256, from: Address, to: Address) -> Result<U256> {
        let http = self.provider.http()?;
        let amounts = IUniswapV2Router::new(self.router, &http)
            .getAmountsOut(amount_in, vec![from, to])
            .call()
            .await
            .with_context(|| format!("getAmountsOut on {}", self.network))?;
        amounts
            .amounts
            .last()
            .copied()
            .context("empty amounts from router")
    }

    /// Buy exactly `amount_out` of `to`, spending at most `amount_in_max`.
    pub async fn swap_tokens_for_exact(
        &self,
        sender: &TransactionSender,
        amount_out: U256,
        amount_in_max: U256,
        from: Address,
        to: Address,
        gas_price: U256,
    ) -> Result<TxOutcome> {
        let calldata = IUniswapV2Router::swapTokensForExactTokensCall {
            amountOut: amount_out,
            amountInMax: amount_in_max,
            path: vec![from, to],
            to: sender.address,
            deadline: Self::deadline(),
        }
        .abi_encode();
        let outcome = sender
            .send(self.router, calldata.into(), SWAP_GAS_LIMIT, gas_price)
            .await
            .context("swapTokensForExactTokens failed")?;
        info!(network = %self.network, tx = %outcome.tx_hash, "Swap confirmed");
        Ok(outcome)
    }

    /// Sell exactly `amount_in` of `from`, receiving at least
    /// `amount_out_min`.
    pub async fn swap_exact_tokens(
        &self,
        sender: &TransactionSender,
        amount_in: U256,
        amount_out_min: U256,
        from: Address,
        to: Address,
        gas_price: U256,
    ) -> Result<TxOutcome> {
        let calldata = IUniswapV2Router::swapExactTokensForTokensCall {
            amountIn: amount_in,
            amountOutMin: amount_out_min,
            path: vec![from, to],
            to: sender.address,
            deadline: Self::deadline(),
        }
        .abi_encode();
        let outcome = sender
            .send(self.router, calldata.into(), SWAP_GAS_LIMIT, gas_price)
            .await
            .context("swapExactTokensForTokens failed")?;
        info!(network = %self.network, tx = %outcome.tx_hash, "Swap confirmed");
        Ok(outcome)
    }
}
