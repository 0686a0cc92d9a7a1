use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::{BundleResult, Ferry, PurgeReport};

/// Background housekeeping for expired bundles and abandoned uploads.
///
/// Expired bundles are already invisible to every operation; the reaper only
/// reclaims their storage.
pub struct BundleReaper {
    ferry: Arc<Ferry>,
    interval: Duration,
}

impl BundleReaper {
    /// Create a new reaper running every 60 seconds
    pub fn new(ferry: Arc<Ferry>) -> Self {
        Self {
            ferry,
            interval: Duration::from_secs(60),
        }
    }

    /// Create reaper with custom interval
    pub fn with_interval(ferry: Arc<Ferry>, interval: Duration) -> Self {
        Self { ferry, interval }
    }

    /// Run forever. Spawn this on the runtime.
    pub async fn start(self) {
        let mut ticker = interval(self.interval);

        info!("Starting bundle reaper with interval: {:?}", self.interval);

        loop {
            ticker.tick().await;

            match self.reap_once().await {
                Ok(report) if report != PurgeReport::default() => {
                    info!(
                        bundles = report.bundles,
                        blobs = report.blobs,
                        uploads = report.uploads,
                        "Reaped expired data"
                    );
                }
                Ok(_) => debug!("Nothing to reap"),
                Err(e) => warn!("Error during bundle reaping: {}", e),
            }
        }
    }

    /// Run one reaper cycle
    pub async fn reap_once(&self) -> BundleResult<PurgeReport> {
        self.ferry.purge_expired().await
    }
}
