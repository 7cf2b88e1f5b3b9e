//! Token rows: reserve assets with risk parameters and the bot wallet's
//! balance of each, refreshed after swaps and liquidations.

use chrono::Utc;

use crate::models::TokenRecord;
use crate::{Result, Store, StoreError};

const TOKEN_COLUMNS: &str =
    "address, network_id, symbol, decimals, ltv, liquidation_threshold, liquidation_bonus, \
     reserve_factor, usage_as_collateral, borrowing_enabled, stable_rate_enabled, is_active, \
     is_frozen, a_token, stable_debt_token, variable_debt_token, balance";

impl Store {
    /// Insert or update a reserve token.
    pub async fn upsert_token(&self, record: &TokenRecord) -> Result<()> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO tokens (
                address, network_id, symbol, decimals, ltv, liquidation_threshold,
                liquidation_bonus, reserve_factor, usage_as_collateral, borrowing_enabled,
                stable_rate_enabled, is_active, is_frozen, a_token, stable_debt_token,
                variable_debt_token, balance, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?18)
            ON CONFLICT (address, network_id) DO UPDATE SET
                symbol = excluded.symbol,
                decimals = excluded.decimals,
                ltv = excluded.ltv,
                liquidation_threshold = excluded.liquidation_threshold,
                liquidation_bonus = excluded.liquidation_bonus,
                reserve_factor = excluded.reserve_factor,
                usage_as_collateral = excluded.usage_as_collateral,
                borrowing_enabled = excluded.borrowing_enabled,
                stable_rate_enabled = excluded.stable_rate_enabled,
                is_active = excluded.is_active,
                is_frozen = excluded.is_frozen,
                a_token = excluded.a_token,
                stable_debt_token = excluded.stable_debt_token,
                variable_debt_token = excluded.variable_debt_token,
                balance = excluded.balance,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&record.address)
        .bind(&record.network_id)
        .bind(&record.symbol)
        .bind(record.decimals)
        .bind(&record.ltv)
        .bind(&record.liquidation_threshold)
        .bind(record.liquidation_bonus)
        .bind(&record.reserve_factor)
        .bind(record.usage_as_collateral)
        .bind(record.borrowing_enabled)
        .bind(record.stable_rate_enabled)
        .bind(record.is_active)
        .bind(record.is_frozen)
        .bind(&record.a_token)
        .bind(&record.stable_debt_token)
        .bind(&record.variable_debt_token)
        .bind(&record.balance)
        .bind(now)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// All tokens tracked on one network.
    pub async fn tokens_for(&self, network_id: &str) -> Result<Vec<TokenRecord>> {
        let sql = format!("SELECT {TOKEN_COLUMNS} FROM tokens WHERE network_id = ?1");
        Ok(sqlx::query_as::<_, TokenRecord>(&sql)
            .bind(network_id)
            .fetch_all(self.pool())
            .await?)
    }

    /// One token by address and network.
    pub async fn token(&self, address: &str, network_id: &str) -> Result<TokenRecord> {
        let sql =
            format!("SELECT {TOKEN_COLUMNS} FROM tokens WHERE address = ?1 AND network_id = ?2");
        sqlx::query_as::<_, TokenRecord>(&sql)
            .bind(address)
            .bind(network_id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| StoreError::TokenNotFound {
                address: address.to_string(),
                network: network_id.to_string(),
            })
    }

    /// Refresh the wallet balance of one token.
    pub async fn set_token_balance(
        &self,
        address: &str,
        network_id: &str,
        balance: &str,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE tokens SET balance = ?3, updated_at = ?4 WHERE address = ?1 AND network_id = ?2",
        )
        .bind(address)
        .bind(network_id)
        .bind(balance)
        .bind(Utc::now())
        .execute(self.pool())
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::models::{NetworkRecord, TokenRecord};
    use crate::test_store;

    fn token(address: &str, network: &str, symbol: &str) -> TokenRecord {
        TokenRecord {
            address: address.to_string(),
            network_id: network.to_string(),
            symbol: symbol.to_string(),
            decimals: 18,
            ltv: "8000".into(),
            liquidation_threshold: "8250".into(),
            liquidation_bonus: 10750,
            reserve_factor: "1000".into(),
            usage_as_collateral: true,
            borrowing_enabled: true,
            stable_rate_enabled: true,
            is_active: true,
            is_frozen: false,
            a_token: format!("{address}-a"),
            stable_debt_token: format!("{address}-s"),
            variable_debt_token: format!("{address}-v"),
            balance: "0".into(),
        }
    }

    #[tokio::test]
    async fn upsert_and_lookup() {
        let store = test_store().await;
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

        store.upsert_token(&token("0xdai", "eth", "DAI")).await.unwrap();
        store.upsert_token(&token("0xweth", "eth", "WETH")).await.unwrap();

        assert_eq!(store.tokens_for("eth").await.unwrap().len(), 2);

        store
            .set_token_balance("0xdai", "eth", "5000000000000000000")
            .await
            .unwrap();
        let dai = store.token("0xdai", "eth").await.unwrap();
        assert_eq!(dai.balance, "5000000000000000000");
        assert_eq!(dai.liquidation_bonus, 10750);

        assert!(store.token("0xusdc", "eth").await.is_err());
    }
}
