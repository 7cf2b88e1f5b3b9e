//! Network rows: seeded at startup, balance refreshed after funds-moving
//! transactions, deactivated (never deleted) when unreachable.

use chrono::Utc;

use crate::models::NetworkRecord;
use crate::{Result, Store};

impl Store {
    /// Insert or update a network row.
    pub async fn upsert_network(&self, record: &NetworkRecord) -> Result<()> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO networks (id, rpc_url, reserve_rpc_url, balance, is_active, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
            ON CONFLICT (id) DO UPDATE SET
                rpc_url = excluded.rpc_url,
                reserve_rpc_url = excluded.reserve_rpc_url,
                balance = excluded.balance,
                is_active = excluded.is_active,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&record.id)
        .bind(&record.rpc_url)
        .bind(&record.reserve_rpc_url)
        .bind(&record.balance)
        .bind(record.is_active)
        .bind(now)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Mark a network unreachable. The row stays for history and reactivation.
    pub async fn deactivate_network(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE networks SET is_active = 0, updated_at = ?2 WHERE id = ?1")
            .bind(id)
            .bind(Utc::now())
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Refresh the wallet native balance after a funds-moving transaction.
    pub async fn set_network_balance(&self, id: &str, balance: &str) -> Result<()> {
        sqlx::query("UPDATE networks SET balance = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(id)
            .bind(balance)
            .bind(Utc::now())
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// All active networks.
    pub async fn active_networks(&self) -> Result<Vec<NetworkRecord>> {
        let rows = sqlx::query_as::<_, NetworkRecord>(
            "SELECT id, rpc_url, reserve_rpc_url, balance, is_active FROM networks WHERE is_active = 1",
        )
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use crate::models::NetworkRecord;
    use crate::test_store;

    fn network(id: &str, active: bool) -> NetworkRecord {
        NetworkRecord {
            id: id.to_string(),
            rpc_url: Some("http://127.0.0.1:8545/".to_string()),
            reserve_rpc_url: None,
            balance: "0".to_string(),
            is_active: active,
        }
    }

    #[tokio::test]
    async fn upsert_and_deactivate() {
        let store = test_store().await;

        store.upsert_network(&network("eth", true)).await.unwrap();
        store.upsert_network(&network("bsc", false)).await.unwrap();

        let active = store.active_networks().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "eth");

        store.deactivate_network("eth").await.unwrap();
        assert!(store.active_networks().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn balance_refresh() {
        let store = test_store().await;
        store.upsert_network(&network("eth", true)).await.unwrap();

        store
            .set_network_balance("eth", "1000000000000000000")
            .await
            .unwrap();

        let active = store.active_networks().await.unwrap();
        assert_eq!(active[0].balance, "1000000000000000000");
    }
}
