//! Periodic purge of finished tasks and their results once they are older
//! than the retention window. Keeps the queue's records, its journal and the
//! result store bounded by recent traffic.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::domain::TaskId;
use crate::ports::{Clock, ResultStore, TaskQueue};

pub struct GcLoop {
    queue: Arc<dyn TaskQueue>,
    results: Arc<dyn ResultStore>,
    clock: Arc<dyn Clock>,
    retention: Duration,
    interval: Duration,
}

impl GcLoop {
    pub fn new(
        queue: Arc<dyn TaskQueue>,
        results: Arc<dyn ResultStore>,
        clock: Arc<dyn Clock>,
        retention: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            queue,
            results,
            clock,
            retention,
            interval,
        }
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    self.sweep().await;
                }
            }
        }
        tracing::debug!("GC stopped");
    }

    /// One pass. Returns the purged task ids.
    pub async fn sweep(&self) -> Vec<TaskId> {
        let Some(cutoff) = chrono::Duration::from_std(self.retention)
            .ok()
            .and_then(|retention| self.clock.now().checked_sub_signed(retention))
        else {
            return Vec::new();
        };

        let purged = match self.queue.purge_terminal(cutoff).await {
            Ok(purged) => purged,
            Err(e) => {
                tracing::error!(error = %e, "Purging finished tasks failed");
                return Vec::new();
            }
        };
        if purged.is_empty() {
            return purged;
        }

        match self.results.remove(&purged).await {
            Ok(results) => tracing::info!(
                tasks = purged.len(),
                results,
                retention_ms = self.retention.as_millis() as u64,
                "Purged finished tasks"
            ),
            Err(e) => tracing::error!(error = %e, "Purging results failed"),
        }
        purged
    }
}
