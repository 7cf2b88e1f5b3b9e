//! Listener rows: one watched contract per network with a resumable
//! block cursor. The cursor only moves forward.

use chrono::Utc;

use crate::models::ListenerRecord;
use crate::{Result, Store};

impl Store {
    /// Create a listener if absent; an existing row keeps its cursor.
    pub async fn ensure_listener(
        &self,
        contract_address: &str,
        name: &str,
        network_id: &str,
        start_block: Option<i64>,
    ) -> Result<ListenerRecord> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO listeners (contract_address, name, network_id, last_block, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            ON CONFLICT (contract_address, network_id) DO UPDATE SET
                name = excluded.name,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(contract_address)
        .bind(name)
        .bind(network_id)
        .bind(start_block)
        .bind(now)
        .execute(self.pool())
        .await?;

        let row = sqlx::query_as::<_, ListenerRecord>(
            "SELECT contract_address, name, network_id, last_block FROM listeners \
             WHERE contract_address = ?1 AND network_id = ?2",
        )
        .bind(contract_address)
        .bind(network_id)
        .fetch_one(self.pool())
        .await?;
        Ok(row)
    }

    /// Listeners joined to active networks only.
    pub async fn listeners(&self, name: Option<&str>) -> Result<Vec<ListenerRecord>> {
        let mut sql = String::from(
            "SELECT l.contract_address, l.name, l.network_id, l.last_block \
             FROM listeners l JOIN networks n ON n.id = l.network_id \
             WHERE n.is_active = 1",
        );
        if name.is_some() {
            sql.push_str(" AND l.name = ?1");
        }
        let mut query = sqlx::query_as::<_, ListenerRecord>(&sql);
        if let Some(name) = name {
            query = query.bind(name);
        }
        Ok(query.fetch_all(self.pool()).await?)
    }

    /// Advance the confirmed-block cursor; lower blocks are ignored so the
    /// persisted value is monotonically non-decreasing.
    pub async fn advance_cursor(
        &self,
        contract_address: &str,
        network_id: &str,
        block: i64,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE listeners SET last_block = ?3, updated_at = ?4 \
             WHERE contract_address = ?1 AND network_id = ?2 \
               AND (last_block IS NULL OR last_block <= ?3)",
        )
        .bind(contract_address)
        .bind(network_id)
        .bind(block)
        .bind(Utc::now())
        .execute(self.pool())
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::models::NetworkRecord;
    use crate::test_store;

    #[tokio::test]
    async fn cursor_is_monotone() {
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

        let listener = store
            .ensure_listener("0xpool", "lending-pool", "eth", Some(100))
            .await
            .unwrap();
        assert_eq!(listener.last_block, Some(100));

        store.advance_cursor("0xpool", "eth", 150).await.unwrap();
        // A stale writer must not move the cursor back.
        store.advance_cursor("0xpool", "eth", 120).await.unwrap();

        let listeners = store.listeners(Some("lending-pool")).await.unwrap();
        assert_eq!(listeners[0].last_block, Some(150));
    }

    #[tokio::test]
    async fn ensure_keeps_existing_cursor() {
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

        store
            .ensure_listener("0xpool", "lending-pool", "eth", Some(100))
            .await
            .unwrap();
        store.advance_cursor("0xpool", "eth", 500).await.unwrap();

        // Restart path: ensure again with the deploy block.
        let listener = store
            .ensure_listener("0xpool", "lending-pool", "eth", Some(100))
            .await
            .unwrap();
        assert_eq!(listener.last_block, Some(500));
    }
}
