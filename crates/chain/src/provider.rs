//! Per-network provider handles.
//!
//! One handle per configured network, built at startup and shared by every
//! worker. Providers are constructed per call from the stored URL, the same
//! way contract instances are; alloy keeps the underlying HTTP client cheap
//! to create.

use alloy::primitives::{Address, U256};
use alloy::providers::{Provider, ProviderBuilder};
use anyhow::Result;
use tracing::debug;

/// RPC endpoints for one network.
#[derive(Debug, Clone)]
pub struct NetworkProvider {
    /// Network identifier (e.g. "eth", "gnosis").
    pub network: String,
    http_url: String,
    /// Secondary endpoint used for reserve-liquidity reads; falls back to
    /// the primary when absent.
    reserve_http_url: Option<String>,
}

impl NetworkProvider {
    pub fn new(
        network: impl Into<String>,
        http_url: impl Into<String>,
        reserve_http_url: Option<String>,
    ) -> Self {
        Self {
            network: network.into(),
            http_url: http_url.into(),
            reserve_http_url,
        }
    }

    /// Build a provider on the primary endpoint.
    pub fn http(&self) -> Result<impl Provider> {
        Ok(ProviderBuilder::new().on_http(self.http_url.parse()?))
    }

    /// Build a provider on the reserve-liquidity endpoint.
    pub fn reserve_http(&self) -> Result<impl Provider> {
        let url = self.reserve_http_url.as_deref().unwrap_or(&self.http_url);
        Ok(ProviderBuilder::new().on_http(url.parse()?))
    }

    /// Current chain head.
    pub async fn block_number(&self) -> Result<u64> {
        let block = self.http()?.get_block_number().await?;
        Ok(block)
    }

    /// Single gas-price snapshot; taken once per liquidation attempt.
    pub async fn gas_price(&self) -> Result<U256> {
        let price = self.http()?.get_gas_price().await?;
        debug!(network = %self.network, gas_price = price, "Gas price snapshot");
        Ok(U256::from(price))
    }

    /// Native-currency balance of an address.
    pub async fn native_balance(&self, address: Address) -> Result<U256> {
        let balance = self.http()?.get_balance(address).await?;
        Ok(balance)
    }
}
