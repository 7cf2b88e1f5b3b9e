//! Liquidation candidate rows.
//!
//! Rows are never hard-deleted: terminal statuses (`liquidated`,
//! `cancelled`, `error`) stay for bookkeeping. At most one row per user may
//! be non-terminal at a time; re-detection updates the live row in place and
//! the `candidates_one_active_per_user` partial index makes a racing second
//! writer fail instead of inserting a duplicate.

use chrono::{DateTime, Utc};

use crate::models::{CandidateRecord, CandidateStatus};
use crate::{Result, Store};

const CANDIDATE_COLUMNS: &str =
    "c.id, c.user_id, c.status, c.estimated_profit_eth, c.fact_profit_eth, c.to_update_date, \
     c.error, c.created_at, c.updated_at, u.address, u.network_id";

impl Store {
    /// The user's live (non-terminal) candidate, if any.
    pub async fn active_candidate(&self, user_id: i64) -> Result<Option<CandidateRecord>> {
        let sql = format!(
            "SELECT {CANDIDATE_COLUMNS} FROM candidates c JOIN user_accounts u ON u.id = c.user_id \
             WHERE c.user_id = ?1 AND c.status IN ('pending', 'processing', 'deferred')"
        );
        Ok(sqlx::query_as::<_, CandidateRecord>(&sql)
            .bind(user_id)
            .fetch_optional(self.pool())
            .await?)
    }

    /// Create or re-price the user's live candidate.
    pub async fn upsert_candidate(
        &self,
        user_id: i64,
        status: CandidateStatus,
        estimated_profit_eth: &str,
        to_update_date: Option<DateTime<Utc>>,
    ) -> Result<CandidateRecord> {
        let now = Utc::now();
        match self.active_candidate(user_id).await? {
            Some(existing) => {
                sqlx::query(
                    "UPDATE candidates SET status = ?2, estimated_profit_eth = ?3, \
                     to_update_date = ?4, updated_at = ?5 WHERE id = ?1",
                )
                .bind(existing.id)
                .bind(status)
                .bind(estimated_profit_eth)
                .bind(to_update_date)
                .bind(now)
                .execute(self.pool())
                .await?;
            }
            None => {
                sqlx::query(
                    "INSERT INTO candidates \
                     (user_id, status, estimated_profit_eth, to_update_date, created_at, updated_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                )
                .bind(user_id)
                .bind(status)
                .bind(estimated_profit_eth)
                .bind(to_update_date)
                .bind(now)
                .execute(self.pool())
                .await?;
            }
        }

        // The partial index guarantees exactly one live row here.
        self.active_candidate(user_id)
            .await?
            .ok_or(crate::StoreError::Database(sqlx::Error::RowNotFound))
    }

    /// The single in-flight candidate, if one is being executed.
    pub async fn processing_candidate(&self) -> Result<Option<CandidateRecord>> {
        let sql = format!(
            "SELECT {CANDIDATE_COLUMNS} FROM candidates c JOIN user_accounts u ON u.id = c.user_id \
             WHERE c.status = 'processing'"
        );
        Ok(sqlx::query_as::<_, CandidateRecord>(&sql)
            .fetch_optional(self.pool())
            .await?)
    }

    /// Pending and deferred candidates awaiting reconciliation.
    pub async fn open_candidates(&self) -> Result<Vec<CandidateRecord>> {
        let sql = format!(
            "SELECT {CANDIDATE_COLUMNS} FROM candidates c JOIN user_accounts u ON u.id = c.user_id \
             WHERE c.status IN ('pending', 'deferred')"
        );
        Ok(sqlx::query_as::<_, CandidateRecord>(&sql)
            .fetch_all(self.pool())
            .await?)
    }

    /// Pending candidates in creation order; profit ranking happens in the
    /// queue so 256-bit values never round-trip through SQL casts.
    pub async fn pending_candidates(&self) -> Result<Vec<CandidateRecord>> {
        let sql = format!(
            "SELECT {CANDIDATE_COLUMNS} FROM candidates c JOIN user_accounts u ON u.id = c.user_id \
             WHERE c.status = 'pending' ORDER BY c.created_at ASC, c.id ASC"
        );
        Ok(sqlx::query_as::<_, CandidateRecord>(&sql)
            .fetch_all(self.pool())
            .await?)
    }

    /// Transition a candidate, optionally recording an error message.
    pub async fn set_candidate_status(
        &self,
        id: i64,
        status: CandidateStatus,
        error: Option<&str>,
    ) -> Result<()> {
        sqlx::query("UPDATE candidates SET status = ?2, error = ?3, updated_at = ?4 WHERE id = ?1")
            .bind(id)
            .bind(status)
            .bind(error)
            .bind(Utc::now())
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Record a completed liquidation and its realized profit.
    pub async fn mark_liquidated(&self, id: i64, fact_profit_eth: &str) -> Result<()> {
        sqlx::query(
            "UPDATE candidates SET status = 'liquidated', fact_profit_eth = ?2, updated_at = ?3 \
             WHERE id = ?1",
        )
        .bind(id)
        .bind(fact_profit_eth)
        .bind(Utc::now())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Cancel the user's live candidate, if any. Returns whether a row changed.
    pub async fn cancel_active_candidate(&self, user_id: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE candidates SET status = 'cancelled', updated_at = ?2 \
             WHERE user_id = ?1 AND status IN ('pending', 'processing', 'deferred')",
        )
        .bind(user_id)
        .bind(Utc::now())
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Backdate a candidate's `updated_at`, used by staleness tests.
    #[doc(hidden)]
    pub async fn backdate_candidate(&self, id: i64, updated_at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE candidates SET updated_at = ?2 WHERE id = ?1")
            .bind(id)
            .bind(updated_at)
            .execute(self.pool())
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::models::{CandidateStatus, NetworkRecord, NewUserAccount};
    use crate::test_store;
    use crate::Store;

    async fn seed_user(store: &Store, address: &str) -> i64 {
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
            .upsert_user_account(&NewUserAccount {
                address: address.to_string(),
                network_id: "eth".into(),
                total_collateral_eth: "0".into(),
                total_debt_eth: "0".into(),
                available_borrows_eth: "0".into(),
                current_liquidation_threshold: "8500".into(),
                ltv: "8000".into(),
                health_factor: 0.9,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn one_active_candidate_per_user() {
        let store = test_store().await;
        let user_id = seed_user(&store, "0xa").await;

        let first = store
            .upsert_candidate(user_id, CandidateStatus::Pending, "100", None)
            .await
            .unwrap();
        // A second detection re-prices the existing row instead of inserting.
        let second = store
            .upsert_candidate(user_id, CandidateStatus::Deferred, "42", Some(Utc::now()))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.status, CandidateStatus::Deferred);
        assert_eq!(second.estimated_profit_eth, "42");
        assert_eq!(store.open_candidates().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn terminal_rows_allow_a_new_candidate() {
        let store = test_store().await;
        let user_id = seed_user(&store, "0xa").await;

        let first = store
            .upsert_candidate(user_id, CandidateStatus::Pending, "100", None)
            .await
            .unwrap();
        store.mark_liquidated(first.id, "95").await.unwrap();
        assert!(store.active_candidate(user_id).await.unwrap().is_none());

        let second = store
            .upsert_candidate(user_id, CandidateStatus::Pending, "7", None)
            .await
            .unwrap();
        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn cancel_touches_only_live_rows() {
        let store = test_store().await;
        let user_id = seed_user(&store, "0xa").await;

        let candidate = store
            .upsert_candidate(user_id, CandidateStatus::Pending, "100", None)
            .await
            .unwrap();
        store.mark_liquidated(candidate.id, "95").await.unwrap();

        assert!(!store.cancel_active_candidate(user_id).await.unwrap());

        store
            .upsert_candidate(user_id, CandidateStatus::Pending, "7", None)
            .await
            .unwrap();
        assert!(store.cancel_active_candidate(user_id).await.unwrap());
        assert!(store.active_candidate(user_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn processing_lookup_and_status_moves() {
        let store = test_store().await;
        let user_id = seed_user(&store, "0xa").await;

        let candidate = store
            .upsert_candidate(user_id, CandidateStatus::Pending, "100", None)
            .await
            .unwrap();
        assert!(store.processing_candidate().await.unwrap().is_none());

        store
            .set_candidate_status(candidate.id, CandidateStatus::Processing, None)
            .await
            .unwrap();
        let processing = store.processing_candidate().await.unwrap().unwrap();
        assert_eq!(processing.id, candidate.id);
        assert_eq!(processing.address, "0xa");
        assert_eq!(processing.network_id, "eth");
    }
}
