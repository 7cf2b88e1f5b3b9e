//! Liquidation-opportunity estimator.
//!
//! Pure computation over a snapshot of one borrower's reserves: picks the
//! collateral/debt pair and repay amount that extract the most value in one
//! liquidation call. The caller supplies protocol liquidity per token and
//! decides afterwards how to fund the repayment (owned balance vs flash
//! loan); nothing here touches chain or database state.

use std::collections::HashMap;

use alloy::primitives::{Address, U256};

use crate::wad_math::{apply_bonus, eth_to_token, min, token_to_eth, unapply_bonus};

/// One reserve position (collateral or debt) of a borrower.
#[derive(Debug, Clone)]
pub struct ReserveSnapshot {
    pub symbol: String,
    pub address: Address,
    pub decimals: u8,
    /// Liquidation bonus as a full multiplier in basis points
    /// (10750 = liquidator receives 107.5% of the repaid value).
    pub liquidation_bonus: u32,
    /// Raw token units held (deposit) or owed (debt).
    pub amount: U256,
    /// The same amount in ETH-equivalent wei at the current oracle rate.
    pub amount_eth: U256,
    /// Oracle rate, wei per whole token.
    pub rate: U256,
}

/// A borrower's collateral and debt reserves, in deterministic
/// reserve-list order. Stable and variable debt in the same asset arrive
/// already aggregated into one entry.
#[derive(Debug, Clone, Default)]
pub struct UserReserves {
    pub collateral: Vec<ReserveSnapshot>,
    pub debt: Vec<ReserveSnapshot>,
}

/// The single most profitable liquidation for a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opportunity {
    pub collateral_asset: Address,
    pub debt_asset: Address,
    /// Repay amount in debt-token units.
    pub debt_to_cover: U256,
    /// Expected gross revenue in ETH-equivalent wei (before fees).
    pub max_revenue_eth: U256,
}

/// Outcome of evaluating one collateral against a given repay amount.
#[derive(Debug, Clone)]
struct CollateralOutcome {
    contract_address: Address,
    /// Collateral value received, ETH-equivalent wei.
    return_amount_eth: U256,
    /// Repay amount after liquidity capping, ETH-equivalent wei.
    max_repay_eth: U256,
    /// return - repay.
    revenue_eth: U256,
}

/// Evaluate every collateral for a repay of `repay_eth` and keep the one
/// returning the biggest extractable position (highest `return_amount_eth`,
/// not highest revenue ratio; first seen wins ties).
fn best_collateral(
    collateral: &[ReserveSnapshot],
    liquidity: &HashMap<Address, U256>,
    repay_eth: U256,
) -> Option<CollateralOutcome> {
    let mut best: Option<CollateralOutcome> = None;

    for token in collateral {
        let protocol_reserve = liquidity.get(&token.address).copied().unwrap_or(U256::ZERO);
        // The protocol can only seize what the borrower deposited and what
        // it actually holds of that asset.
        let available = min(token.amount, protocol_reserve);
        let available_eth = token_to_eth(available, token.rate, token.decimals);

        let want = apply_bonus(repay_eth, token.liquidation_bonus);

        let outcome = if want <= available_eth {
            CollateralOutcome {
                contract_address: token.address,
                return_amount_eth: want,
                max_repay_eth: repay_eth,
                revenue_eth: want - repay_eth,
            }
        } else {
            // Not enough collateral to honor the full repay: scale the repay
            // down so the bonus-adjusted return exactly matches what is
            // available.
            let max_repay_eth = unapply_bonus(available_eth, token.liquidation_bonus);
            CollateralOutcome {
                contract_address: token.address,
                return_amount_eth: available_eth,
                max_repay_eth,
                revenue_eth: available_eth - max_repay_eth,
            }
        };

        let is_better = match &best {
            Some(current) => outcome.return_amount_eth > current.return_amount_eth,
            None => true,
        };
        if is_better {
            best = Some(outcome);
        }
    }

    best
}

/// Determine the most profitable liquidation action for a reserves
/// snapshot, or `None` when the borrower has no debt or nothing yields
/// positive revenue.
///
/// `liquidity` maps each token address to the protocol-wide liquidity of
/// that asset in raw token units.
pub fn estimate(
    reserves: &UserReserves,
    liquidity: &HashMap<Address, U256>,
) -> Option<Opportunity> {
    if reserves.debt.is_empty() {
        return None;
    }

    let mut best: Option<Opportunity> = None;

    for debt in &reserves.debt {
        // Protocol convention: a single call may repay at most half of a
        // position's principal.
        let repay = debt.amount / U256::from(2u8);
        let repay_eth = token_to_eth(repay, debt.rate, debt.decimals);

        let Some(outcome) = best_collateral(&reserves.collateral, liquidity, repay_eth) else {
            continue;
        };

        let is_better = match &best {
            Some(current) => outcome.revenue_eth > current.max_revenue_eth,
            None => true,
        };
        if is_better {
            best = Some(Opportunity {
                collateral_asset: outcome.contract_address,
                debt_asset: debt.address,
                debt_to_cover: eth_to_token(outcome.max_repay_eth, debt.rate, debt.decimals),
                max_revenue_eth: outcome.revenue_eth,
            });
        }
    }

    match best {
        Some(opportunity) if !opportunity.max_revenue_eth.is_zero() => Some(opportunity),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wad_math::{apply_bonus, parse_wei};

    fn addr(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    const DAI: u8 = 0x01;
    const WETH: u8 = 0x02;
    const USDC: u8 = 0x03;

    fn snapshot(
        symbol: &str,
        address: Address,
        decimals: u8,
        bonus: u32,
        amount: &str,
        amount_eth: &str,
        rate: &str,
    ) -> ReserveSnapshot {
        ReserveSnapshot {
            symbol: symbol.to_string(),
            address,
            decimals,
            liquidation_bonus: bonus,
            amount: parse_wei(amount).unwrap(),
            amount_eth: parse_wei(amount_eth).unwrap(),
            rate: parse_wei(rate).unwrap(),
        }
    }

    /// Liquidity deep enough to never cap.
    fn deep_liquidity(reserves: &UserReserves) -> HashMap<Address, U256> {
        reserves
            .collateral
            .iter()
            .chain(&reserves.debt)
            .map(|t| (t.address, t.amount * U256::from(1000u64)))
            .collect()
    }

    /// 1 DAI = 0.001 ETH, 1 WETH = 1 ETH.
    /// Deposits: 10 WETH; debts: 5000 DAI; bonus 7.5%.
    fn one_debt_one_collateral() -> UserReserves {
        UserReserves {
            collateral: vec![snapshot(
                "WETH",
                addr(WETH),
                18,
                10750,
                "10000000000000000000",
                "10000000000000000000",
                "1000000000000000000",
            )],
            debt: vec![snapshot(
                "DAI",
                addr(DAI),
                18,
                10500,
                "5000000000000000000000",
                "5000000000000000000",
                "1000000000000000",
            )],
        }
    }

    /// 1 USDC = 0.0013 ETH; deposits: 1 DAI + 1 WETH; debts: 700 USDC.
    fn one_debt_two_collaterals() -> UserReserves {
        UserReserves {
            collateral: vec![
                snapshot(
                    "DAI",
                    addr(DAI),
                    18,
                    10500,
                    "1000000000000000000",
                    "1000000000000000",
                    "1000000000000000",
                ),
                snapshot(
                    "WETH",
                    addr(WETH),
                    18,
                    10750,
                    "1000000000000000000",
                    "1000000000000000000",
                    "1000000000000000000",
                ),
            ],
            debt: vec![snapshot(
                "USDC",
                addr(USDC),
                6,
                10500,
                "700000001",
                "910000001300000000",
                "1300000000000000",
            )],
        }
    }

    fn multiple_debts() -> UserReserves {
        UserReserves {
            collateral: vec![snapshot(
                "WETH",
                addr(WETH),
                18,
                10750,
                "1000000000000000000",
                "1000000000000000000",
                "1000000000000000000",
            )],
            debt: vec![
                snapshot(
                    "DAI",
                    addr(DAI),
                    18,
                    10500,
                    "1000000000000000000000",
                    "1000000000000000000",
                    "1000000000000000",
                ),
                snapshot(
                    "USDC",
                    addr(USDC),
                    6,
                    10500,
                    "500000000",
                    "650000000000000000",
                    "1300000000000000",
                ),
            ],
        }
    }

    #[test]
    fn test_no_debts_yields_none() {
        let reserves = UserReserves {
            collateral: vec![snapshot(
                "USDC",
                addr(USDC),
                6,
                10500,
                "500000000",
                "650000000000000000",
                "1300000000000000",
            )],
            debt: vec![],
        };
        let liquidity = deep_liquidity(&reserves);
        assert!(estimate(&reserves, &liquidity).is_none());
    }

    #[test]
    fn test_one_debt_one_collateral() {
        let reserves = one_debt_one_collateral();
        let liquidity = deep_liquidity(&reserves);
        let opportunity = estimate(&reserves, &liquidity).unwrap();

        assert_eq!(opportunity.collateral_asset, addr(WETH));
        assert_eq!(opportunity.debt_asset, addr(DAI));
        // 50% of 5000 DAI.
        assert_eq!(
            opportunity.debt_to_cover,
            parse_wei("2500000000000000000000").unwrap()
        );
        // 2.5 ETH * 7.5% bonus = 0.1875 ETH revenue.
        assert_eq!(
            opportunity.max_revenue_eth,
            parse_wei("187500000000000000").unwrap()
        );
    }

    #[test]
    fn test_never_covers_more_than_half() {
        let reserves = one_debt_one_collateral();
        let liquidity = deep_liquidity(&reserves);
        let opportunity = estimate(&reserves, &liquidity).unwrap();

        let debt = &reserves.debt[0];
        assert!(opportunity.debt_to_cover <= debt.amount / U256::from(2u8));
    }

    #[test]
    fn test_prefers_biggest_extractable_collateral() {
        // The 1 DAI deposit can only return 0.001 ETH; WETH wins even though
        // both bonuses would be profitable.
        let reserves = one_debt_two_collaterals();
        let liquidity = deep_liquidity(&reserves);
        let opportunity = estimate(&reserves, &liquidity).unwrap();

        assert_eq!(opportunity.collateral_asset, addr(WETH));
        assert_eq!(opportunity.debt_asset, addr(USDC));
        // 50% of 700.000001 USDC, floored.
        assert_eq!(opportunity.debt_to_cover, U256::from(350_000_000u64));
    }

    #[test]
    fn test_picks_highest_revenue_debt() {
        let reserves = multiple_debts();
        let liquidity = deep_liquidity(&reserves);
        let opportunity = estimate(&reserves, &liquidity).unwrap();

        // Repaying 0.5 ETH of DAI beats repaying 0.325 ETH of USDC.
        assert_eq!(opportunity.debt_asset, addr(DAI));
        assert_eq!(
            opportunity.debt_to_cover,
            parse_wei("500000000000000000000").unwrap()
        );
    }

    #[test]
    fn test_liquidity_cap_scales_repay_down() {
        let reserves = one_debt_one_collateral();
        // Only 1 WETH of protocol liquidity: the unconstrained 2.6875 ETH
        // return must be capped and the repay scaled down.
        let mut liquidity = HashMap::new();
        liquidity.insert(addr(WETH), parse_wei("1000000000000000000").unwrap());
        liquidity.insert(addr(DAI), U256::ZERO);

        let opportunity = estimate(&reserves, &liquidity).unwrap();
        let collateral = &reserves.collateral[0];
        let debt = &reserves.debt[0];

        let capped_eth = token_to_eth(
            liquidity[&addr(WETH)],
            collateral.rate,
            collateral.decimals,
        );
        let max_repay_eth = unapply_bonus(capped_eth, collateral.liquidation_bonus);
        assert_eq!(opportunity.max_revenue_eth, capped_eth - max_repay_eth);
        assert_eq!(
            opportunity.debt_to_cover,
            eth_to_token(max_repay_eth, debt.rate, debt.decimals)
        );

        // Round-trip: re-applying the bonus to the scaled repay reproduces
        // the capped return within one bps-division of rounding.
        let replayed = apply_bonus(max_repay_eth, collateral.liquidation_bonus);
        assert!(capped_eth - replayed < U256::from(10_000u64));
    }

    #[test]
    fn test_zero_revenue_yields_none() {
        // Borrower has debt but no collateral at all.
        let reserves = UserReserves {
            collateral: vec![],
            debt: vec![snapshot(
                "DAI",
                addr(DAI),
                18,
                10500,
                "5000000000000000000000",
                "5000000000000000000",
                "1000000000000000",
            )],
        };
        let liquidity = deep_liquidity(&reserves);
        assert!(estimate(&reserves, &liquidity).is_none());
    }
}
