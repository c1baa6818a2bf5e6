//! Dispatcher: the caller-facing side of the system.
//!
//! Validates and enqueues notifications, answers status queries, and
//! cancels tasks that have not started. It never sends anything itself;
//! delivery belongs to the `WorkerPool`.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::{
    DeliveryResult, EmailPayload, Payload, SmsPayload, Task, TaskId, TaskStatus,
};
use crate::error::HeraldError;
use crate::ports::{Clock, IdGenerator, QueueCounts, ResultStore, TaskQueue};
use crate::queue::CANCELLED;

use super::status::TaskReport;

#[derive(Clone)]
pub struct Dispatcher {
    queue: Arc<dyn TaskQueue>,
    results: Arc<dyn ResultStore>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
}

impl Dispatcher {
    pub fn new(
        queue: Arc<dyn TaskQueue>,
        results: Arc<dyn ResultStore>,
        ids: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            queue,
            results,
            ids,
            clock,
        }
    }

    pub async fn submit_email(&self, payload: EmailPayload) -> Result<TaskId, HeraldError> {
        self.submit(payload.into()).await
    }

    pub async fn submit_sms(&self, payload: SmsPayload) -> Result<TaskId, HeraldError> {
        self.submit(payload.into()).await
    }

    /// Validate and enqueue. Returns as soon as the task is durably queued;
    /// an invalid payload is rejected here and never reaches a worker.
    pub async fn submit(&self, payload: Payload) -> Result<TaskId, HeraldError> {
        if let Err(e) = payload.validate() {
            tracing::warn!(channel = %payload.channel(), error = %e, "Notification rejected");
            return Err(e.into());
        }

        let task = Task::new(self.ids.generate_task_id(), payload, self.clock.now());
        let channel = task.channel();
        let destination = task.payload.destination();
        let task_id = self.queue.enqueue(task).await?;

        tracing::info!(
            task_id = %task_id,
            channel = %channel,
            destination = %destination,
            "Notification queued"
        );
        Ok(task_id)
    }

    pub async fn task(&self, task_id: TaskId) -> Result<Task, HeraldError> {
        self.queue
            .get(task_id)
            .await?
            .ok_or(HeraldError::NotFound(task_id))
    }

    pub async fn status(&self, task_id: TaskId) -> Result<TaskStatus, HeraldError> {
        Ok(self.task(task_id).await?.status)
    }

    /// Terminal outcome, or `None` while the task is still Pending/InFlight.
    /// The result can appear just before an InFlight task's status flips.
    ///
    /// Workers record before acking, so a delivered or exhausted task always
    /// has its result. Cancellation and reaping flip the status first; their
    /// result follows within the same call or sweep.
    pub async fn result(&self, task_id: TaskId) -> Result<Option<DeliveryResult>, HeraldError> {
        // distinguish "unknown id" from "not finished yet"
        self.task(task_id).await?;
        Ok(self.results.get(task_id).await?)
    }

    pub async fn report(&self, task_id: TaskId) -> Result<TaskReport, HeraldError> {
        let task = self.task(task_id).await?;
        let result = self.results.get(task_id).await?;
        Ok(TaskReport::new(task, result))
    }

    pub async fn counts(&self) -> Result<QueueCounts, HeraldError> {
        Ok(self.queue.counts().await?)
    }

    /// Cancel a Pending task. InFlight and terminal tasks are refused with
    /// `QueueError::NotCancellable`.
    pub async fn cancel(&self, task_id: TaskId) -> Result<Task, HeraldError> {
        let task = self.queue.cancel(task_id).await?;
        let result = DeliveryResult::error(task.id, CANCELLED, task.attempts, self.clock.now());
        self.results.record(result).await?;
        tracing::info!(task_id = %task_id, attempts = task.attempts, "Notification cancelled");
        Ok(task)
    }

    /// Poll until the task reaches Succeeded or Failed.
    pub async fn wait_for(
        &self,
        task_id: TaskId,
        poll_interval: Duration,
        deadline: Duration,
    ) -> Result<Task, HeraldError> {
        let poll = async {
            loop {
                let task = self.task(task_id).await?;
                if task.is_terminal() {
                    return Ok::<_, HeraldError>(task);
                }
                tokio::time::sleep(poll_interval).await;
            }
        };
        tokio::time::timeout(deadline, poll)
            .await
            .map_err(|_| HeraldError::WaitTimedOut(task_id))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DeliveryOutcome, ValidationError};
    use crate::impls::InMemoryResultStore;
    use crate::ports::{QueueError, SystemClock, UlidGenerator};
    use crate::queue::{InMemoryTaskQueue, QueueOptions};
    use ulid::Ulid;

    fn dispatcher() -> (Dispatcher, Arc<InMemoryTaskQueue>) {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let queue = Arc::new(InMemoryTaskQueue::new(QueueOptions::default(), clock.clone()));
        let dispatcher = Dispatcher::new(
            queue.clone(),
            Arc::new(InMemoryResultStore::new()),
            Arc::new(UlidGenerator::new(clock.clone())),
            clock,
        );
        (dispatcher, queue)
    }

    #[tokio::test]
    async fn submit_queues_a_pending_task() {
        let (dispatcher, _queue) = dispatcher();
        let id = dispatcher
            .submit_email(EmailPayload::plain(["a@example.com"], "Hi", "Hello"))
            .await
            .unwrap();

        let task = dispatcher.task(id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.attempts, 0);
        assert!(dispatcher.result(id).await.unwrap().is_none());
        assert_eq!(dispatcher.counts().await.unwrap().pending, 1);
    }

    #[tokio::test]
    async fn invalid_payload_is_rejected_without_enqueueing() {
        let (dispatcher, _queue) = dispatcher();
        let err = dispatcher
            .submit_sms(SmsPayload::new("+15550000", ""))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            HeraldError::Validation(ValidationError::EmptySmsBody)
        ));
        assert_eq!(dispatcher.counts().await.unwrap(), QueueCounts::default());
    }

    #[tokio::test]
    async fn unknown_task_is_not_found() {
        let (dispatcher, _queue) = dispatcher();
        let id = TaskId::from_ulid(Ulid::new());
        assert!(matches!(
            dispatcher.status(id).await,
            Err(HeraldError::NotFound(got)) if got == id
        ));
        assert!(matches!(
            dispatcher.result(id).await,
            Err(HeraldError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn cancel_pending_records_a_cancelled_result() {
        let (dispatcher, _queue) = dispatcher();
        let id = dispatcher
            .submit_sms(SmsPayload::new("+15550000", "hi"))
            .await
            .unwrap();

        let task = dispatcher.cancel(id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Failed);

        let result = dispatcher.result(id).await.unwrap().unwrap();
        assert_eq!(result.outcome, DeliveryOutcome::Error);
        assert_eq!(result.detail, CANCELLED);
        assert_eq!(result.attempts, 0);
    }

    #[tokio::test]
    async fn cancel_in_flight_is_refused() {
        let (dispatcher, queue) = dispatcher();
        let id = dispatcher
            .submit_sms(SmsPayload::new("+15550000", "hi"))
            .await
            .unwrap();
        let _lease = queue.dequeue().await.unwrap();

        let err = dispatcher.cancel(id).await.unwrap_err();
        assert!(matches!(
            err,
            HeraldError::Queue(QueueError::NotCancellable { .. })
        ));
        assert!(dispatcher.result(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn wait_for_times_out_on_unfinished_task() {
        let (dispatcher, _queue) = dispatcher();
        let id = dispatcher
            .submit_sms(SmsPayload::new("+15550000", "hi"))
            .await
            .unwrap();

        let err = dispatcher
            .wait_for(id, Duration::from_millis(5), Duration::from_millis(30))
            .await
            .unwrap_err();
        assert!(matches!(err, HeraldError::WaitTimedOut(got) if got == id));
    }
}
