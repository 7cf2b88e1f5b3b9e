//! Execution driver: prices and performs liquidations.
//!
//! The dry-run path (`estimate`) assembles the borrower's reserve snapshot,
//! runs the pure estimator and prices the execution plan: funding source
//! (owned reserve balance vs flash loan), one gas snapshot, flash premium.
//! The live path (`execute`) replays the same plan with transactions: swap
//! legs through the router, the liquidation or flash-loan call, and a
//! balance reconciliation that yields the realized profit.

use std::collections::HashMap;
use std::sync::Arc;

use alloy::primitives::{Address, I256, U256};
use anyhow::{bail, Context, Result};
use tracing::{debug, info};
use vigil_chain::{address_key, flash_liquidation_params, NetworkHandle, NetworkMap};
use vigil_store::Store;

use crate::estimator::{estimate, Opportunity, ReserveSnapshot, UserReserves};
use crate::wad_math::{parse_wei, to_signed, token_to_eth};

/// Gas-unit budgets per transaction leg, priced with one gas snapshot per
/// attempt.
const APPROVE_GAS: u64 = 60_000;
const SWAP_GAS: u64 = 150_000;
const LIQUIDATION_GAS: u64 = 700_000;
const FLASH_LOAN_GAS: u64 = 1_300_000;

/// Flash-loan premium in basis points (0.09%).
const FLASH_LOAN_PREMIUM_BPS: u64 = 9;

/// A priced liquidation plan for one borrower.
#[derive(Debug, Clone)]
pub struct ProfitEstimate {
    pub opportunity: Opportunity,
    /// True when the owned reserve balance cannot fund the repayment.
    pub use_flash_loan: bool,
    /// Gas price snapshot the plan was priced at (wei).
    pub gas_price: U256,
    /// Total gas fee across all legs, ETH-equivalent wei.
    pub gas_fee_eth: U256,
    /// Flash-loan premium, ETH-equivalent wei (zero on the owned path).
    pub flash_fee_eth: U256,
}

impl ProfitEstimate {
    /// Net profit after fees; may be negative.
    pub fn estimated_profit_eth(&self) -> I256 {
        to_signed(self.opportunity.max_revenue_eth)
            - to_signed(self.gas_fee_eth)
            - to_signed(self.flash_fee_eth)
    }
}

/// Total gas units for a plan.
fn plan_gas_units(opportunity: &Opportunity, reserve_token: Address, use_flash_loan: bool) -> u64 {
    let mut units = if use_flash_loan {
        FLASH_LOAN_GAS
    } else {
        let mut units = APPROVE_GAS + LIQUIDATION_GAS;
        if opportunity.debt_asset != reserve_token {
            units += APPROVE_GAS + SWAP_GAS;
        }
        units
    };
    if opportunity.collateral_asset != reserve_token {
        units += APPROVE_GAS + SWAP_GAS;
    }
    units
}

pub struct ExecutionDriver {
    store: Store,
    chains: Arc<NetworkMap>,
}

impl ExecutionDriver {
    pub fn new(store: Store, chains: Arc<NetworkMap>) -> Self {
        Self { store, chains }
    }

    fn handle(&self, network: &str) -> Result<Arc<NetworkHandle>> {
        self.chains
            .get(network)
            .cloned()
            .with_context(|| format!("network not configured: {network}"))
    }

    /// Build the borrower's reserve snapshot: walk the user-configuration
    /// bitmask over the reserve list, read wrapper-token balances and
    /// oracle rates, and aggregate stable plus variable debt per asset.
    async fn user_reserves(&self, handle: &NetworkHandle, user: Address) -> Result<UserReserves> {
        let tokens = self.store.tokens_for(&handle.network).await?;
        let configuration = handle.pool.user_configuration(user).await?;
        let reserve_list = handle.pool.reserves_list().await?;

        let mut reserves = UserReserves::default();

        for (i, asset) in reserve_list.iter().enumerate() {
            let has_debt = configuration.bit(2 * i);
            let has_collateral = configuration.bit(2 * i + 1);
            if !has_debt && !has_collateral {
                continue;
            }

            let key = address_key(*asset);
            let token = tokens
                .iter()
                .find(|t| t.address == key)
                .with_context(|| format!("token not tracked: {key} on {}", handle.network))?;
            let decimals = token.decimals as u8;
            let rate = handle.pool.asset_price(*asset).await?;

            if has_collateral {
                let a_token: Address = token.a_token.parse().context("invalid aToken address")?;
                let amount = handle.erc20_balance(a_token, user).await?;
                reserves.collateral.push(ReserveSnapshot {
                    symbol: token.symbol.clone(),
                    address: *asset,
                    decimals,
                    liquidation_bonus: token.liquidation_bonus as u32,
                    amount,
                    amount_eth: token_to_eth(amount, rate, decimals),
                    rate,
                });
            }

            if has_debt {
                let stable: Address = token
                    .stable_debt_token
                    .parse()
                    .context("invalid stable debt token address")?;
                let variable: Address = token
                    .variable_debt_token
                    .parse()
                    .context("invalid variable debt token address")?;
                let (stable_amount, variable_amount) = tokio::try_join!(
                    handle.erc20_balance(stable, user),
                    handle.erc20_balance(variable, user)
                )?;
                let amount = stable_amount + variable_amount;
                reserves.debt.push(ReserveSnapshot {
                    symbol: token.symbol.clone(),
                    address: *asset,
                    decimals,
                    liquidation_bonus: token.liquidation_bonus as u32,
                    amount,
                    amount_eth: token_to_eth(amount, rate, decimals),
                    rate,
                });
            }
        }

        Ok(reserves)
    }

    /// Protocol-wide liquidity for every asset in the snapshot: the
    /// underlying balance held by each interest-bearing wrapper, read over
    /// the reserve-liquidity endpoint.
    async fn protocol_liquidity(
        &self,
        handle: &NetworkHandle,
        reserves: &UserReserves,
    ) -> Result<HashMap<Address, U256>> {
        let tokens = self.store.tokens_for(&handle.network).await?;
        let mut liquidity = HashMap::new();

        for snapshot in reserves.collateral.iter().chain(&reserves.debt) {
            if liquidity.contains_key(&snapshot.address) {
                continue;
            }
            let key = address_key(snapshot.address);
            let token = tokens
                .iter()
                .find(|t| t.address == key)
                .with_context(|| format!("token not tracked: {key} on {}", handle.network))?;
            let a_token: Address = token.a_token.parse().context("invalid aToken address")?;
            let available = handle.reserve_liquidity(snapshot.address, a_token).await?;
            liquidity.insert(snapshot.address, available);
        }

        Ok(liquidity)
    }

    /// Price the best liquidation for one borrower, or `None` when no
    /// opportunity exists or the owned path cannot fund its swap.
    pub async fn estimate(&self, address: &str, network: &str) -> Result<Option<ProfitEstimate>> {
        let handle = self.handle(network)?;
        let user: Address = address.parse().context("invalid user address")?;

        let reserves = self.user_reserves(&handle, user).await?;
        let liquidity = self.protocol_liquidity(&handle, &reserves).await?;
        let Some(opportunity) = estimate(&reserves, &liquidity) else {
            return Ok(None);
        };

        let gas_price = handle.provider.gas_price().await?;
        let reserve_record = self
            .store
            .token(&address_key(handle.reserve_token), &handle.network)
            .await?;
        let reserve_balance =
            parse_wei(&reserve_record.balance).context("invalid reserve balance")?;
        let reserve_rate = handle.pool.asset_price(handle.reserve_token).await?;
        let reserve_balance_eth =
            token_to_eth(reserve_balance, reserve_rate, reserve_record.decimals as u8);
        let use_flash_loan = reserve_balance_eth < opportunity.max_revenue_eth;

        if !use_flash_loan && opportunity.debt_asset != handle.reserve_token {
            // The owned path buys the debt asset first; a quote the wallet
            // cannot cover is no opportunity, not a success.
            if let Some(swap) = &handle.swap {
                let amount_in = swap
                    .amounts_in(opportunity.debt_to_cover, handle.reserve_token, opportunity.debt_asset)
                    .await?;
                if amount_in > reserve_balance {
                    debug!(
                        user = %address,
                        network = %network,
                        "Reserve balance cannot fund the repay swap"
                    );
                    return Ok(None);
                }
            }
        }

        let gas_units = plan_gas_units(&opportunity, handle.reserve_token, use_flash_loan);
        let gas_fee_eth = gas_price * U256::from(gas_units);

        let flash_fee_eth = if use_flash_loan {
            let debt = reserves
                .debt
                .iter()
                .find(|d| d.address == opportunity.debt_asset)
                .context("debt reserve missing from snapshot")?;
            let premium = (opportunity.debt_to_cover * U256::from(FLASH_LOAN_PREMIUM_BPS))
                / U256::from(10_000u64);
            token_to_eth(premium, debt.rate, debt.decimals)
        } else {
            U256::ZERO
        };

        debug!(
            user = %address,
            network = %network,
            collateral = %opportunity.collateral_asset,
            debt = %opportunity.debt_asset,
            max_revenue_eth = %opportunity.max_revenue_eth,
            use_flash_loan,
            "Liquidation plan priced"
        );

        Ok(Some(ProfitEstimate {
            opportunity,
            use_flash_loan,
            gas_price,
            gas_fee_eth,
            flash_fee_eth,
        }))
    }

    /// Execute the current best liquidation for one borrower and return the
    /// realized profit (ETH-equivalent wei, signed decimal): reserve-asset
    /// gain minus native currency spent.
    pub async fn execute(&self, address: &str, network: &str) -> Result<String> {
        let handle = self.handle(network)?;
        let user: Address = address.parse().context("invalid user address")?;
        let reserve = handle.reserve_token;

        let reserve_record = self.store.token(&address_key(reserve), network).await?;
        let reserve_decimals = reserve_record.decimals as u8;
        let reserve_rate = handle.pool.asset_price(reserve).await?;
        let native_before = handle
            .provider
            .native_balance(handle.sender.address)
            .await?;
        let reserve_before = handle.erc20_balance(reserve, handle.sender.address).await?;

        // Parameters may have moved since enrollment; price the plan fresh.
        let plan = self
            .estimate(address, network)
            .await?
            .context("no liquidation opportunity")?;
        let opportunity = &plan.opportunity;
        let gas_price = plan.gas_price;

        if plan.use_flash_loan {
            let adapter = handle
                .flash_loan_adapter
                .context("flash-loan adapter not configured")?;
            let params = flash_liquidation_params(
                opportunity.collateral_asset,
                opportunity.debt_asset,
                user,
                opportunity.debt_to_cover,
                false,
            );
            let outcome = handle
                .pool
                .flash_loan(
                    &handle.sender,
                    adapter,
                    opportunity.debt_asset,
                    opportunity.debt_to_cover,
                    params,
                    gas_price,
                )
                .await?;
            info!(
                user = %address,
                network = %network,
                tx = %outcome.tx_hash,
                "Flash-loan liquidation sent"
            );
        } else {
            if opportunity.debt_asset != reserve {
                self.swap_from_reserve(&handle, opportunity.debt_asset, opportunity.debt_to_cover, gas_price)
                    .await?;
            }
            handle
                .approve(
                    opportunity.debt_asset,
                    handle.pool.address(),
                    opportunity.debt_to_cover,
                    gas_price,
                )
                .await?;
            let outcome = handle
                .pool
                .liquidation_call(
                    &handle.sender,
                    opportunity.collateral_asset,
                    opportunity.debt_asset,
                    user,
                    opportunity.debt_to_cover,
                    gas_price,
                )
                .await?;
            info!(
                user = %address,
                network = %network,
                tx = %outcome.tx_hash,
                "Liquidation call sent"
            );
        }

        // Convert the seized collateral back into the reserve asset.
        if opportunity.collateral_asset != reserve {
            let seized = self
                .update_token_balance(&handle, opportunity.collateral_asset)
                .await?;
            if !seized.is_zero() {
                self.swap_to_reserve(&handle, opportunity.collateral_asset, seized, gas_price)
                    .await?;
            }
        }

        let native_after = handle
            .provider
            .native_balance(handle.sender.address)
            .await?;
        let reserve_after = self.update_token_balance(&handle, reserve).await?;
        self.store
            .set_network_balance(network, &native_after.to_string())
            .await?;

        let reserve_gain = to_signed(token_to_eth(reserve_after, reserve_rate, reserve_decimals))
            - to_signed(token_to_eth(reserve_before, reserve_rate, reserve_decimals));
        let native_spent = to_signed(native_before) - to_signed(native_after);
        Ok((reserve_gain - native_spent).to_string())
    }

    /// Buy exactly `amount_out` of `token` with the reserve asset.
    async fn swap_from_reserve(
        &self,
        handle: &NetworkHandle,
        token: Address,
        amount_out: U256,
        gas_price: U256,
    ) -> Result<()> {
        let swap = handle.swap.as_ref().context("swap router not configured")?;
        let reserve = handle.reserve_token;

        let amount_in = swap.amounts_in(amount_out, reserve, token).await?;
        let record = self.store.token(&address_key(reserve), &handle.network).await?;
        let balance = parse_wei(&record.balance).context("invalid reserve balance")?;
        if amount_in > balance {
            bail!("insufficient reserve funds for swap");
        }

        handle
            .approve(reserve, swap.address(), amount_in, gas_price)
            .await?;
        swap.swap_tokens_for_exact(&handle.sender, amount_out, amount_in, reserve, token, gas_price)
            .await?;

        self.update_token_balance(handle, reserve).await?;
        self.update_token_balance(handle, token).await?;
        Ok(())
    }

    /// Sell `amount_in` of `token` for the reserve asset.
    async fn swap_to_reserve(
        &self,
        handle: &NetworkHandle,
        token: Address,
        amount_in: U256,
        gas_price: U256,
    ) -> Result<()> {
        let swap = handle.swap.as_ref().context("swap router not configured")?;
        let reserve = handle.reserve_token;

        let amount_out_min = swap.amounts_out(amount_in, token, reserve).await?;
        handle
            .approve(token, swap.address(), amount_in, gas_price)
            .await?;
        swap.swap_exact_tokens(&handle.sender, amount_in, amount_out_min, token, reserve, gas_price)
            .await?;

        self.update_token_balance(handle, reserve).await?;
        self.update_token_balance(handle, token).await?;
        Ok(())
    }

    /// Re-read the wallet balance of one token from chain and persist it.
    async fn update_token_balance(&self, handle: &NetworkHandle, token: Address) -> Result<U256> {
        let balance = handle.erc20_balance(token, handle.sender.address).await?;
        self.store
            .set_token_balance(&address_key(token), &handle.network, &balance.to_string())
            .await?;
        Ok(balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opportunity(collateral: Address, debt: Address) -> Opportunity {
        Opportunity {
            collateral_asset: collateral,
            debt_asset: debt,
            debt_to_cover: U256::from(1_000_000u64),
            max_revenue_eth: U256::from(100u64),
        }
    }

    #[test]
    fn test_plan_gas_units_owned_path() {
        let reserve = Address::repeat_byte(1);
        let other = Address::repeat_byte(2);

        // Both legs in the reserve asset: approve + liquidate only.
        let opp = opportunity(reserve, reserve);
        assert_eq!(plan_gas_units(&opp, reserve, false), APPROVE_GAS + LIQUIDATION_GAS);

        // Foreign debt adds a buy leg, foreign collateral a sell leg.
        let opp = opportunity(other, other);
        assert_eq!(
            plan_gas_units(&opp, reserve, false),
            APPROVE_GAS + LIQUIDATION_GAS + 2 * (APPROVE_GAS + SWAP_GAS)
        );
    }

    #[test]
    fn test_plan_gas_units_flash_path() {
        let reserve = Address::repeat_byte(1);
        let other = Address::repeat_byte(2);

        // Flash loan folds approval and liquidation into one call.
        let opp = opportunity(reserve, other);
        assert_eq!(plan_gas_units(&opp, reserve, true), FLASH_LOAN_GAS);

        let opp = opportunity(other, other);
        assert_eq!(
            plan_gas_units(&opp, reserve, true),
            FLASH_LOAN_GAS + APPROVE_GAS + SWAP_GAS
        );
    }

    #[test]
    fn test_estimated_profit_subtracts_fees() {
        let estimate = ProfitEstimate {
            opportunity: Opportunity {
                collateral_asset: Address::repeat_byte(1),
                debt_asset: Address::repeat_byte(2),
                debt_to_cover: U256::from(1u64),
                max_revenue_eth: U256::from(1_000u64),
            },
            use_flash_loan: true,
            gas_price: U256::from(1u64),
            gas_fee_eth: U256::from(600u64),
            flash_fee_eth: U256::from(700u64),
        };
        // Fees exceed revenue: the profit goes negative instead of clamping.
        assert_eq!(
            estimate.estimated_profit_eth(),
            I256::try_from(-300i64).unwrap()
        );
    }
}
