//! Per-zone periodic re-scan jobs.
//!
//! One tokio task per monitored zone (Green is never re-scanned). Each
//! tick loads the zone's borrowers across all active networks and refreshes
//! them concurrently through the position tracker; enrollment and
//! cancellation side effects belong to the tracker.

use std::sync::Arc;

use anyhow::Result;
use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{info, warn};
use vigil_store::Store;

use crate::config::{MonitorConfig, ZoneConfig};
use crate::tracker::PositionTracker;
use crate::zone::Zone;

pub struct ZoneMonitor {
    store: Store,
    tracker: Arc<PositionTracker>,
    zones: ZoneConfig,
    cadence: MonitorConfig,
}

impl ZoneMonitor {
    pub fn new(
        store: Store,
        tracker: Arc<PositionTracker>,
        zones: ZoneConfig,
        cadence: MonitorConfig,
    ) -> Self {
        Self {
            store,
            tracker,
            zones,
            cadence,
        }
    }

    /// Spawn one periodic job per monitored zone.
    pub fn spawn(self: Arc<Self>) -> Vec<JoinHandle<()>> {
        Zone::monitored()
            .into_iter()
            .map(|zone| {
                let monitor = Arc::clone(&self);
                let period = match zone {
                    Zone::Urgent => monitor.cadence.urgent_interval(),
                    Zone::Red => monitor.cadence.red_interval(),
                    Zone::Orange => monitor.cadence.orange_interval(),
                    Zone::Yellow => monitor.cadence.yellow_interval(),
                    Zone::Green => unreachable!("green is never monitored"),
                };
                tokio::spawn(async move {
                    let mut ticker = interval(period);
                    loop {
                        ticker.tick().await;
                        if let Err(e) = monitor.scan_zone(zone).await {
                            warn!(zone = %zone, error = %e, "Zone scan failed");
                        }
                    }
                })
            })
            .collect()
    }

    /// Refresh every borrower currently in `zone`, concurrently.
    pub async fn scan_zone(&self, zone: Zone) -> Result<()> {
        let users = self
            .store
            .users_in_band(zone.band(&self.zones), None)
            .await?;
        if users.is_empty() {
            return Ok(());
        }

        let refreshes = users.iter().map(|user| {
            let tracker = Arc::clone(&self.tracker);
            async move {
                // The previous health factor travels through the tracker's
                // transition log; an individual failure only skips this user.
                if let Err(e) = tracker.refresh(&user.address, &user.network_id).await {
                    warn!(
                        user = %user.address,
                        network = %user.network_id,
                        prev_hf = user.health_factor,
                        error = %e,
                        "Zone refresh failed"
                    );
                }
            }
        });
        join_all(refreshes).await;

        info!(zone = %zone, users = users.len(), "Zone scan complete");
        Ok(())
    }
}
