//! One-shot deferred re-check scheduling.
//!
//! A deferred candidate carries a `to_update_date`; this scheduler fires a
//! refresh request exactly once at or after that time. Jobs are keyed by
//! (user, network) so a fresh tracker run cancels the outstanding job
//! before scheduling decisions are remade.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// A request to re-run the position tracker for one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshRequest {
    pub address: String,
    pub network: String,
}

type JobKey = (String, String);

/// Schedules one-shot wake-ups that are delivered as [`RefreshRequest`]s
/// on a channel; the consumer drives the actual tracker refresh.
pub struct RecheckScheduler {
    jobs: DashMap<JobKey, JoinHandle<()>>,
    tx: mpsc::UnboundedSender<RefreshRequest>,
}

impl RecheckScheduler {
    /// Returns the scheduler and the receiving end of the refresh channel.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<RefreshRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                jobs: DashMap::new(),
                tx,
            }),
            rx,
        )
    }

    /// Schedule a re-check at `at`, replacing any job already queued for
    /// this user.
    pub fn schedule(self: &Arc<Self>, address: &str, network: &str, at: DateTime<Utc>) {
        let key = (address.to_string(), network.to_string());
        self.cancel(address, network);

        let delay = (at - Utc::now())
            .to_std()
            .unwrap_or(std::time::Duration::ZERO);
        let request = RefreshRequest {
            address: address.to_string(),
            network: network.to_string(),
        };
        let scheduler = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            scheduler
                .jobs
                .remove(&(request.address.clone(), request.network.clone()));
            // Receiver dropped means shutdown; nothing left to wake.
            let _ = scheduler.tx.send(request);
        });

        debug!(user = %key.0, network = %key.1, at = %at, "Re-check scheduled");
        self.jobs.insert(key, handle);
    }

    /// Cancel the user's outstanding re-check, if any.
    pub fn cancel(&self, address: &str, network: &str) {
        if let Some((key, handle)) = self
            .jobs
            .remove(&(address.to_string(), network.to_string()))
        {
            handle.abort();
            debug!(user = %key.0, network = %key.1, "Re-check cancelled");
        }
    }

    /// Number of outstanding jobs.
    pub fn pending_jobs(&self) -> usize {
        self.jobs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_fires_once_at_deadline() {
        let (scheduler, mut rx) = RecheckScheduler::new();
        scheduler.schedule("0xa", "eth", Utc::now() + Duration::milliseconds(20));

        let request = rx.recv().await.unwrap();
        assert_eq!(request.address, "0xa");
        assert_eq!(request.network, "eth");
        assert_eq!(scheduler.pending_jobs(), 0);
    }

    #[tokio::test]
    async fn test_cancel_prevents_delivery() {
        let (scheduler, mut rx) = RecheckScheduler::new();
        scheduler.schedule("0xa", "eth", Utc::now() + Duration::milliseconds(20));
        scheduler.cancel("0xa", "eth");
        assert_eq!(scheduler.pending_jobs(), 0);

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_reschedule_replaces_job() {
        let (scheduler, mut rx) = RecheckScheduler::new();
        scheduler.schedule("0xa", "eth", Utc::now() + Duration::seconds(3600));
        scheduler.schedule("0xa", "eth", Utc::now() + Duration::milliseconds(20));
        assert_eq!(scheduler.pending_jobs(), 1);

        let request = rx.recv().await.unwrap();
        assert_eq!(request.address, "0xa");
        // The hour-out job was replaced, not queued behind.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_past_deadline_fires_immediately() {
        let (scheduler, mut rx) = RecheckScheduler::new();
        scheduler.schedule("0xa", "eth", Utc::now() - Duration::seconds(5));
        assert!(rx.recv().await.is_some());
    }
}
