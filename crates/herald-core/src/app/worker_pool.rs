//! WorkerPool: N workers running dequeue -> send -> ack/nack, plus the
//! reaper and the GC loop.
//!
//! Each `send` runs in its own tokio task under a deadline. A channel that
//! errors, hangs, or panics produces a `ChannelError` for that task only; the
//! worker loop itself has no failure path out of it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};

use super::gc_loop::GcLoop;
use super::reaper_loop::ReaperLoop;
use crate::channels::ChannelRegistry;
use crate::config::Config;
use crate::domain::{ChannelError, DeliveryResult, ExhaustedRetries, Task, TaskId};
use crate::ports::{Clock, Lease, QueueError, ResultStore, TaskQueue};
use crate::queue::{RetryDecision, RetryPolicy};

/// Pause after a failed dequeue so a broken journal does not spin a core.
const DEQUEUE_ERROR_BACKOFF: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct PoolOptions {
    pub worker_count: usize,
    pub send_timeout: Duration,
    pub retry: RetryPolicy,
    pub reap_interval: Duration,
    /// How long finished tasks and results are kept.
    pub retention: Duration,
    pub gc_interval: Duration,
}

impl PoolOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            worker_count: config.worker_count,
            send_timeout: config.send_timeout(),
            retry: config.retry_policy(),
            reap_interval: config.reap_interval(),
            retention: config.retention(),
            gc_interval: config.gc_interval(),
        }
    }
}

/// Handle on the running workers.
/// - `request_shutdown()` stops them from taking new tasks
/// - `shutdown_and_join()` also waits for the task in hand to finish
pub struct WorkerPool {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
    worker_count: usize,
}

impl WorkerPool {
    pub fn spawn(
        options: PoolOptions,
        queue: Arc<dyn TaskQueue>,
        channels: Arc<ChannelRegistry>,
        results: Arc<dyn ResultStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut joins = Vec::with_capacity(options.worker_count + 2);
        for worker_id in 0..options.worker_count {
            let worker = Worker {
                id: worker_id,
                queue: Arc::clone(&queue),
                channels: Arc::clone(&channels),
                results: Arc::clone(&results),
                clock: Arc::clone(&clock),
                send_timeout: options.send_timeout,
                retry: options.retry.clone(),
            };
            joins.push(tokio::spawn(worker.run(shutdown_rx.clone())));
        }

        let reaper = ReaperLoop::new(
            Arc::clone(&queue),
            Arc::clone(&results),
            Arc::clone(&clock),
            options.reap_interval,
        );
        joins.push(tokio::spawn(reaper.run(shutdown_rx.clone())));

        let gc = GcLoop::new(
            queue,
            results,
            clock,
            options.retention,
            options.gc_interval,
        );
        joins.push(tokio::spawn(gc.run(shutdown_rx)));

        tracing::info!(
            workers = options.worker_count,
            send_timeout_ms = options.send_timeout.as_millis() as u64,
            max_attempts = options.retry.max_attempts,
            "Worker pool started"
        );

        Self {
            shutdown_tx,
            joins,
            worker_count: options.worker_count,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Stop taking new tasks. Sends already running are not cancelled.
    pub fn request_shutdown(&self) {
        // receivers may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for join in self.joins {
            if let Err(e) = join.await {
                tracing::error!(error = %e, "Worker task ended abnormally");
            }
        }
        tracing::info!("Worker pool stopped");
    }
}

struct Worker {
    id: usize,
    queue: Arc<dyn TaskQueue>,
    channels: Arc<ChannelRegistry>,
    results: Arc<dyn ResultStore>,
    clock: Arc<dyn Clock>,
    send_timeout: Duration,
    retry: RetryPolicy,
}

impl Worker {
    async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            // dequeue may wait indefinitely, so race it against shutdown.
            let lease = tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                lease = self.queue.dequeue() => lease,
            };

            match lease {
                Ok(lease) => self.process(lease).await,
                Err(e) => {
                    tracing::error!(worker = self.id, error = %e, "Dequeue failed");
                    tokio::time::sleep(DEQUEUE_ERROR_BACKOFF).await;
                }
            }
        }
        tracing::debug!(worker = self.id, "Worker stopped");
    }

    async fn process(&self, lease: Lease) {
        let task = lease.task();
        tracing::debug!(
            worker = self.id,
            task_id = %task.id,
            channel = %task.channel(),
            attempt = task.attempts,
            "Delivering"
        );

        match self.deliver(task).await {
            Ok(()) => self.succeed(lease).await,
            Err(err) => self.fail(lease, err).await,
        }
    }

    /// Run the channel's `send` isolated in its own task, under the deadline.
    async fn deliver(&self, task: &Task) -> Result<(), ChannelError> {
        let channel = self
            .channels
            .get(task.channel())
            .ok_or(ChannelError::NotRegistered(task.channel()))?;

        let payload = task.payload.clone();
        let handle = tokio::spawn(async move { channel.send_dyn(&payload).await });
        let abort = handle.abort_handle();

        match tokio::time::timeout(self.send_timeout, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(ChannelError::Panicked(panic_message(join_err))),
            Err(_elapsed) => {
                abort.abort();
                Err(ChannelError::Timeout(self.send_timeout))
            }
        }
    }

    // Results are recorded before the status turns terminal, so a caller
    // that sees Succeeded/Failed can always read the result.

    async fn succeed(&self, lease: Lease) {
        let task_id = lease.task_id();
        let attempts = lease.task().attempts;
        self.record(DeliveryResult::ok(task_id, attempts, self.clock.now()))
            .await;

        match self.queue.ack(lease).await {
            Ok(task) => tracing::info!(
                worker = self.id,
                task_id = %task.id,
                channel = %task.channel(),
                attempts = task.attempts,
                "Notification delivered"
            ),
            Err(e) => self.report_queue_error(task_id, "ack", e),
        }
    }

    async fn fail(&self, lease: Lease, err: ChannelError) {
        let task_id = lease.task_id();
        let attempts = lease.task().attempts;
        let channel = lease.task().channel();

        match self.retry.decide(attempts, &err) {
            RetryDecision::RetryAfter(delay) => {
                tracing::warn!(
                    worker = self.id,
                    task_id = %task_id,
                    channel = %channel,
                    attempt = attempts,
                    retry_in_ms = delay.as_millis() as u64,
                    error = %err,
                    "Delivery failed, retrying"
                );
                if let Err(e) = self.queue.nack(lease, err.to_string(), Some(delay)).await {
                    self.report_queue_error(task_id, "nack", e);
                }
            }
            RetryDecision::GiveUp => {
                let detail = if err.is_transient() {
                    ExhaustedRetries {
                        attempts,
                        last_error: err,
                    }
                    .to_string()
                } else {
                    err.to_string()
                };
                tracing::warn!(
                    worker = self.id,
                    task_id = %task_id,
                    channel = %channel,
                    attempts,
                    detail = %detail,
                    "Giving up on delivery"
                );
                self.record(DeliveryResult::error(
                    task_id,
                    detail.clone(),
                    attempts,
                    self.clock.now(),
                ))
                .await;
                if let Err(e) = self.queue.nack(lease, detail, None).await {
                    self.report_queue_error(task_id, "nack", e);
                }
            }
        }
    }

    async fn record(&self, result: DeliveryResult) {
        let task_id = result.task_id;
        if let Err(e) = self.results.record(result).await {
            tracing::error!(worker = self.id, task_id = %task_id, error = %e, "Recording result failed");
        }
    }

    fn report_queue_error(&self, task_id: TaskId, op: &str, e: QueueError) {
        match e {
            // Reaped while we were sending; the new lease holder owns it now.
            QueueError::LeaseLost(_) => tracing::warn!(
                worker = self.id,
                task_id = %task_id,
                op,
                "Lease lost before completion"
            ),
            e => tracing::error!(
                worker = self.id,
                task_id = %task_id,
                op,
                error = %e,
                "Queue update failed; task will be redelivered after its lease expires"
            ),
        }
    }
}

fn panic_message(err: JoinError) -> String {
    if !err.is_panic() {
        return "send task cancelled".to_string();
    }
    let panic = err.into_panic();
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
