//! Borrower rows: last-writer-wins upserts keyed by (address, network).

use chrono::Utc;

use crate::models::{HfBand, NewUserAccount, UserAccountRecord, HF_NO_DEBT};
use crate::{Result, Store, StoreError};

const ACCOUNT_COLUMNS: &str =
    "id, address, network_id, total_collateral_eth, total_debt_eth, available_borrows_eth, \
     current_liquidation_threshold, ltv, health_factor, updated_at";

impl Store {
    /// Insert or update a borrower row, returning its id.
    ///
    /// Concurrent refreshes race harmlessly: both write values computed from
    /// a fresh on-chain read, so the last writer wins.
    pub async fn upsert_user_account(&self, account: &NewUserAccount) -> Result<i64> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO user_accounts (
                address, network_id, total_collateral_eth, total_debt_eth,
                available_borrows_eth, current_liquidation_threshold, ltv,
                health_factor, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
            ON CONFLICT (address, network_id) DO UPDATE SET
                total_collateral_eth = excluded.total_collateral_eth,
                total_debt_eth = excluded.total_debt_eth,
                available_borrows_eth = excluded.available_borrows_eth,
                current_liquidation_threshold = excluded.current_liquidation_threshold,
                ltv = excluded.ltv,
                health_factor = excluded.health_factor,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&account.address)
        .bind(&account.network_id)
        .bind(&account.total_collateral_eth)
        .bind(&account.total_debt_eth)
        .bind(&account.available_borrows_eth)
        .bind(&account.current_liquidation_threshold)
        .bind(&account.ltv)
        .bind(account.health_factor)
        .bind(now)
        .execute(self.pool())
        .await?;

        let row: (i64,) =
            sqlx::query_as("SELECT id FROM user_accounts WHERE address = ?1 AND network_id = ?2")
                .bind(&account.address)
                .bind(&account.network_id)
                .fetch_one(self.pool())
                .await?;
        Ok(row.0)
    }

    /// One borrower by address and network.
    pub async fn user_account(&self, address: &str, network_id: &str) -> Result<UserAccountRecord> {
        let sql = format!(
            "SELECT {ACCOUNT_COLUMNS} FROM user_accounts WHERE address = ?1 AND network_id = ?2"
        );
        sqlx::query_as::<_, UserAccountRecord>(&sql)
            .bind(address)
            .bind(network_id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| StoreError::UserNotFound {
                address: address.to_string(),
                network: network_id.to_string(),
            })
    }

    /// Borrowers whose health factor falls inside a zone band, active
    /// networks only, most endangered first.
    pub async fn users_in_band(
        &self,
        band: HfBand,
        network_id: Option<&str>,
    ) -> Result<Vec<UserAccountRecord>> {
        let mut sql = String::from(
            "SELECT u.id, u.address, u.network_id, u.total_collateral_eth, u.total_debt_eth, \
             u.available_borrows_eth, u.current_liquidation_threshold, u.ltv, u.health_factor, \
             u.updated_at \
             FROM user_accounts u JOIN networks n ON n.id = u.network_id \
             WHERE n.is_active = 1",
        );

        match band {
            HfBand::NoDebt => sql.push_str(" AND u.health_factor = ?"),
            HfBand::Under(_) => {
                sql.push_str(" AND u.health_factor != ? AND u.health_factor < ?")
            }
            HfBand::Closed(_, _) => {
                sql.push_str(" AND u.health_factor >= ? AND u.health_factor <= ?")
            }
            HfBand::HalfOpen(_, _) => {
                sql.push_str(" AND u.health_factor > ? AND u.health_factor <= ?")
            }
            HfBand::Above(_) => {
                sql.push_str(" AND u.health_factor != ? AND u.health_factor > ?")
            }
        }

        if network_id.is_some() {
            sql.push_str(" AND u.network_id = ?");
        }
        sql.push_str(" ORDER BY u.health_factor ASC");

        let mut query = sqlx::query_as::<_, UserAccountRecord>(&sql);
        query = match band {
            HfBand::NoDebt => query.bind(HF_NO_DEBT),
            HfBand::Under(max) => query.bind(HF_NO_DEBT).bind(max),
            HfBand::Closed(min, max) | HfBand::HalfOpen(min, max) => query.bind(min).bind(max),
            HfBand::Above(min) => query.bind(HF_NO_DEBT).bind(min),
        };
        if let Some(network_id) = network_id {
            query = query.bind(network_id);
        }
        Ok(query.fetch_all(self.pool()).await?)
    }
}

#[cfg(test)]
mod tests {
    use crate::models::{HfBand, NetworkRecord, NewUserAccount, HF_NO_DEBT};
    use crate::test_store;

    fn account(address: &str, network: &str, hf: f64) -> NewUserAccount {
        NewUserAccount {
            address: address.to_string(),
            network_id: network.to_string(),
            total_collateral_eth: "8661077870268560".into(),
            total_debt_eth: "0".into(),
            available_borrows_eth: "6928862296214848".into(),
            current_liquidation_threshold: "8500".into(),
            ltv: "8000".into(),
            health_factor: hf,
        }
    }

    #[tokio::test]
    async fn upsert_is_idempotent() {
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

        let id1 = store.upsert_user_account(&account("0xa", "eth", 1.3)).await.unwrap();
        let id2 = store.upsert_user_account(&account("0xa", "eth", 0.9)).await.unwrap();
        assert_eq!(id1, id2);

        let row = store.user_account("0xa", "eth").await.unwrap();
        assert_eq!(row.health_factor, 0.9);
    }

    #[tokio::test]
    async fn band_selection() {
        let store = test_store().await;
        for (id, active) in [("eth", true), ("bsc", false)] {
            store
                .upsert_network(&NetworkRecord {
                    id: id.into(),
                    rpc_url: None,
                    reserve_rpc_url: None,
                    balance: "0".into(),
                    is_active: active,
                })
                .await
                .unwrap();
        }

        store.upsert_user_account(&account("0xgreen", "eth", HF_NO_DEBT)).await.unwrap();
        store.upsert_user_account(&account("0xurgent", "eth", 0.92)).await.unwrap();
        store.upsert_user_account(&account("0xred", "eth", 1.05)).await.unwrap();
        store.upsert_user_account(&account("0xorange", "eth", 1.3)).await.unwrap();
        store.upsert_user_account(&account("0xyellow", "eth", 2.0)).await.unwrap();
        // Same address on an inactive network must never be selected.
        store.upsert_user_account(&account("0xurgent", "bsc", 0.5)).await.unwrap();

        let urgent = store.users_in_band(HfBand::Under(1.0), None).await.unwrap();
        assert_eq!(urgent.len(), 1);
        assert_eq!(urgent[0].address, "0xurgent");
        assert_eq!(urgent[0].network_id, "eth");

        let red = store.users_in_band(HfBand::Closed(1.0, 1.1), None).await.unwrap();
        assert_eq!(red.len(), 1);
        assert_eq!(red[0].address, "0xred");

        let orange = store.users_in_band(HfBand::HalfOpen(1.1, 1.5), None).await.unwrap();
        assert_eq!(orange.len(), 1);
        assert_eq!(orange[0].address, "0xorange");

        let yellow = store.users_in_band(HfBand::Above(1.5), None).await.unwrap();
        assert_eq!(yellow.len(), 1);
        assert_eq!(yellow[0].address, "0xyellow");

        let green = store.users_in_band(HfBand::NoDebt, None).await.unwrap();
        assert_eq!(green.len(), 1);
        assert_eq!(green[0].address, "0xgreen");
    }
}
