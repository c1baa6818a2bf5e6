//! Periodic sweep that returns abandoned InFlight tasks to the queue.
//!
//! A worker that dies mid-send never acks; once its lease outlives the
//! visibility timeout the reaper either requeues the task or, when the
//! attempt budget is already spent, fails it and records the result.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::domain::DeliveryResult;
use crate::ports::{Clock, ResultStore, TaskQueue};

pub struct ReaperLoop {
    queue: Arc<dyn TaskQueue>,
    results: Arc<dyn ResultStore>,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl ReaperLoop {
    pub fn new(
        queue: Arc<dyn TaskQueue>,
        results: Arc<dyn ResultStore>,
        clock: Arc<dyn Clock>,
        interval: Duration,
    ) -> Self {
        Self {
            queue,
            results,
            clock,
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
        tracing::debug!("Reaper stopped");
    }

    /// One pass. Returns how many tasks changed state.
    pub async fn sweep(&self) -> usize {
        let report = match self.queue.reap_expired().await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(error = %e, "Reaping expired leases failed");
                return 0;
            }
        };
        if report.is_empty() {
            return 0;
        }

        for task_id in &report.requeued {
            tracing::warn!(task_id = %task_id, "Lease expired; task requeued");
        }

        for task in &report.failed {
            let detail = task
                .last_error
                .clone()
                .unwrap_or_else(|| "lease expired".to_string());
            tracing::warn!(
                task_id = %task.id,
                attempts = task.attempts,
                detail = %detail,
                "Lease expired with no attempts left; task failed"
            );
            let result = DeliveryResult::error(task.id, detail, task.attempts, self.clock.now());
            if let Err(e) = self.results.record(result).await {
                tracing::error!(task_id = %task.id, error = %e, "Recording result failed");
            }
        }

        report.requeued.len() + report.failed.len()
    }
}
