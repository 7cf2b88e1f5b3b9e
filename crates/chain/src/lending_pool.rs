//! Typed wrapper over one network's lending-pool deployment.
//!
//! Resolves the pool and price oracle through the addresses-provider
//! registry at startup, then exposes the queries and entry points the rest
//! of the system needs: account data, the user-configuration bitmask,
//! reserve metadata, oracle rates, the liquidation call and the flash-loan
//! call.

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol_types::{SolCall, SolValue};
use anyhow::{Context, Result};
use tracing::info;

use crate::contracts::{
    ILendingPool, ILendingPoolAddressesProvider, IPriceOracleGetter, IProtocolDataProvider,
};
use crate::provider::NetworkProvider;
use crate::signer::{TransactionSender, TxOutcome};

/// Transaction gas limits; fee budgets are priced separately by the caller.
const LIQUIDATION_GAS_LIMIT: u64 = 800_000;
const FLASH_LOAN_GAS_LIMIT: u64 = 1_500_000;

/// Aggregated account state from `getUserAccountData`. All values are
/// ETH-equivalent wei except the basis-point ratios; `health_factor` keeps
/// the protocol's max-uint sentinel for "no debt".
#[derive(Debug, Clone)]
pub struct AccountData {
    pub total_collateral_eth: U256,
    pub total_debt_eth: U256,
    pub available_borrows_eth: U256,
    pub current_liquidation_threshold: U256,
    pub ltv: U256,
    pub health_factor: U256,
}

/// One entry of the protocol's reserve list.
#[derive(Debug, Clone)]
pub struct ReserveToken {
    pub symbol: String,
    pub address: Address,
}

/// Risk parameters of one reserve.
#[derive(Debug, Clone)]
pub struct ReserveConfiguration {
    pub decimals: u8,
    pub ltv: U256,
    pub liquidation_threshold: U256,
    pub liquidation_bonus: u64,
    pub reserve_factor: U256,
    pub usage_as_collateral_enabled: bool,
    pub borrowing_enabled: bool,
    pub stable_borrow_rate_enabled: bool,
    pub is_active: bool,
    pub is_frozen: bool,
}

/// Wrapper-token addresses of one reserve.
#[derive(Debug, Clone)]
pub struct WrapperTokens {
    pub a_token: Address,
    pub stable_debt_token: Address,
    pub variable_debt_token: Address,
}

/// ABI-encode the parameters the flash-loan liquidation adapter expects.
pub fn flash_liquidation_params(
    collateral_asset: Address,
    debt_asset: Address,
    user: Address,
    debt_to_cover: U256,
    use_eth_path: bool,
) -> Bytes {
    (collateral_asset, debt_asset, user, debt_to_cover, use_eth_path)
        .abi_encode()
        .into()
}

#[derive(Debug, Clone)]
pub struct LendingPool {
    network: String,
    provider: NetworkProvider,
    pool: Address,
    oracle: Address,
    data_provider: Address,
}

impl LendingPool {
    /// Resolve the deployed pool and oracle through the registry.
    pub async fn connect(
        provider: NetworkProvider,
        addresses_provider: Address,
        data_provider: Address,
    ) -> Result<Self> {
        let http = provider.http()?;
        let registry = ILendingPoolAddressesProvider::new(addresses_provider, &http);
        let pool = registry
            .getLendingPool()
            .call()
            .await
            .context("resolving lending pool address")?
            ._0;
        let oracle = registry
            .getPriceOracle()
            .call()
            .await
            .context("resolving price oracle address")?
            ._0;

        info!(
            network = %provider.network,
            pool = %pool,
            oracle = %oracle,
            "Lending pool resolved"
        );

        Ok(Self {
            network: provider.network.clone(),
            provider,
            pool,
            oracle,
            data_provider,
        })
    }

    /// The pool contract address (also the spender for repay approvals).
    pub fn address(&self) -> Address {
        self.pool
    }

    pub async fn account_data(&self, user: Address) -> Result<AccountData> {
        let http = self.provider.http()?;
        let data = ILendingPool::new(self.pool, &http)
            .getUserAccountData(user)
            .call()
            .await
            .with_context(|| format!("getUserAccountData({user}) on {}", self.network))?;
        Ok(AccountData {
            total_collateral_eth: data.totalCollateralETH,
            total_debt_eth: data.totalDebtETH,
            available_borrows_eth: data.availableBorrowsETH,
            current_liquidation_threshold: data.currentLiquidationThreshold,
            ltv: data.ltv,
            health_factor: data.healthFactor,
        })
    }

    /// The packed reserve-usage bitmask: bit 2i = borrows reserve i,
    /// bit 2i+1 = uses reserve i as collateral.
    pub async fn user_configuration(&self, user: Address) -> Result<U256> {
        let http = self.provider.http()?;
        let config = ILendingPool::new(self.pool, &http)
            .getUserConfiguration(user)
            .call()
            .await
            .with_context(|| format!("getUserConfiguration({user}) on {}", self.network))?;
        Ok(config.data)
    }

    /// Reserve asset addresses in protocol order (the bitmask's index
    /// space).
    pub async fn reserves_list(&self) -> Result<Vec<Address>> {
        let http = self.provider.http()?;
        let list = ILendingPool::new(self.pool, &http)
            .getReservesList()
            .call()
            .await
            .with_context(|| format!("getReservesList on {}", self.network))?;
        Ok(list._0)
    }

    /// Oracle rate for an asset, wei per whole token.
    pub async fn asset_price(&self, asset: Address) -> Result<U256> {
        let http = self.provider.http()?;
        let price = IPriceOracleGetter::new(self.oracle, &http)
            .getAssetPrice(asset)
            .call()
            .await
            .with_context(|| format!("getAssetPrice({asset}) on {}", self.network))?;
        Ok(price._0)
    }

    pub async fn all_reserves_tokens(&self) -> Result<Vec<ReserveToken>> {
        let http = self.provider.http()?;
        let tokens = IProtocolDataProvider::new(self.data_provider, &http)
            .getAllReservesTokens()
            .call()
            .await
            .with_context(|| format!("getAllReservesTokens on {}", self.network))?;
        Ok(tokens
            ._0
            .into_iter()
            .map(|t| ReserveToken {
                symbol: t.symbol,
                address: t.tokenAddress,
            })
            .collect())
    }

    pub async fn reserve_configuration(&self, asset: Address) -> Result<ReserveConfiguration> {
        let http = self.provider.http()?;
        let data = IProtocolDataProvider::new(self.data_provider, &http)
            .getReserveConfigurationData(asset)
            .call()
            .await
            .with_context(|| format!("getReserveConfigurationData({asset}) on {}", self.network))?;
        Ok(ReserveConfiguration {
            decimals: data.decimals.to::<u8>(),
            ltv: data.ltv,
            liquidation_threshold: data.liquidationThreshold,
            liquidation_bonus: data.liquidationBonus.to::<u64>(),
            reserve_factor: data.reserveFactor,
            usage_as_collateral_enabled: data.usageAsCollateralEnabled,
            borrowing_enabled: data.borrowingEnabled,
            stable_borrow_rate_enabled: data.stableBorrowRateEnabled,
            is_active: data.isActive,
            is_frozen: data.isFrozen,
        })
    }

    pub async fn reserve_token_addresses(&self, asset: Address) -> Result<WrapperTokens> {
        let http = self.provider.http()?;
        let addresses = IProtocolDataProvider::new(self.data_provider, &http)
            .getReserveTokensAddresses(asset)
            .call()
            .await
            .with_context(|| format!("getReserveTokensAddresses({asset}) on {}", self.network))?;
        Ok(WrapperTokens {
            a_token: addresses.aTokenAddress,
            stable_debt_token: addresses.stableDebtTokenAddress,
            variable_debt_token: addresses.variableDebtTokenAddress,
        })
    }

    /// Repay `debt_to_cover` of the user's debt and seize underlying
    /// collateral (never aTokens).
    pub async fn liquidation_call(
        &self,
        sender: &TransactionSender,
        collateral_asset: Address,
        debt_asset: Address,
        user: Address,
        debt_to_cover: U256,
        gas_price: U256,
    ) -> Result<TxOutcome> {
        let calldata = ILendingPool::liquidationCallCall {
            collateralAsset: collateral_asset,
            debtAsset: debt_asset,
            user,
            debtToCover: debt_to_cover,
            receiveAToken: false,
        }
        .abi_encode();
        sender
            .send(self.pool, calldata.into(), LIQUIDATION_GAS_LIMIT, gas_price)
            .await
            .context("liquidationCall failed")
    }

    /// Borrow `amount` of `asset` into the liquidation adapter, which
    /// liquidates and repays within the same transaction.
    pub async fn flash_loan(
        &self,
        sender: &TransactionSender,
        adapter: Address,
        asset: Address,
        amount: U256,
        params: Bytes,
        gas_price: U256,
    ) -> Result<TxOutcome> {
        let calldata = ILendingPool::flashLoanCall {
            receiverAddress: adapter,
            assets: vec![asset],
            amounts: vec![amount],
            // Mode 0: repay in full from proceeds, no debt left behind.
            modes: vec![U256::ZERO],
            onBehalfOf: Address::ZERO,
            params,
            referralCode: 0,
        }
        .abi_encode();
        sender
            .send(self.pool, calldata.into(), FLASH_LOAN_GAS_LIMIT, gas_price)
            .await
            .context("flashLoan failed")
    }
}
