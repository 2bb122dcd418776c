//! Stalled run watchdog
//!
//! Periodically fails runs that are still `running` but whose heartbeat has
//! not moved for longer than the stale timeout.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::repository::{RunStore, StoreResult};

pub const STALLED_LOG_LINE: &str = "Error: run stalled without progress";

pub struct Watchdog {
    store: Arc<dyn RunStore>,
    stale_after: Duration,
    interval: Duration,
}

impl Watchdog {
    pub fn new(store: Arc<dyn RunStore>, stale_after: Duration, interval: Duration) -> Self {
        Self {
            store,
            stale_after,
            interval,
        }
    }

    /// Tick forever
    pub async fn run(self) {
        debug!(
            "Starting stalled run watchdog (interval: {:?}, timeout: {:?})",
            self.interval, self.stale_after
        );
        let mut interval = time::interval(self.interval);

        loop {
            interval.tick().await;

            if let Err(e) = self.sweep().await {
                error!("Watchdog sweep failed: {}", e);
            }
        }
    }

    /// Fail every stalled run once
    pub async fn sweep(&self) -> StoreResult<Vec<Uuid>> {
        let stale_after = chrono::Duration::from_std(self.stale_after)
            .unwrap_or_else(|_| chrono::Duration::MAX);
        let cutoff = Utc::now()
            .checked_sub_signed(stale_after)
            .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);

        let failed = self.store.fail_stale_runs(cutoff, STALLED_LOG_LINE).await?;
        for run_id in &failed {
            warn!("Run {} stalled without progress, marked as failed", run_id);
        }

        Ok(failed)
    }
}
