//! In-memory queue, optionally backed by a journal file.

use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use super::journal::Journal;
use super::record::{LeaseSlot, TaskRecord};
use crate::domain::{Task, TaskId, TaskStatus};
use crate::ports::{
    Clock, Lease, LeaseToken, QueueCounts, QueueError, ReapReport, TaskQueue,
};

pub const CANCELLED: &str = "cancelled";

/// The journal is rewritten once it holds more than
/// `COMPACT_RATIO * live tasks + COMPACT_MIN_LINES` lines.
pub(crate) const COMPACT_RATIO: usize = 4;
pub(crate) const COMPACT_MIN_LINES: usize = 64;

#[derive(Debug, Clone)]
pub struct QueueOptions {
    /// How long a dequeued task stays hidden before it is presumed abandoned.
    pub visibility_timeout: Duration,

    /// Attempts after which a reaped task is failed instead of requeued.
    pub max_attempts: u32,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            visibility_timeout: Duration::from_secs(30),
            max_attempts: 3,
        }
    }
}

/// Retried task waiting out its backoff.
///
/// Reverse ordering so BinaryHeap acts as a min-heap (earliest first).
#[derive(Debug, Clone, PartialEq, Eq)]
struct ScheduledTask {
    visible_at: Instant,
    task_id: TaskId,
}

impl PartialOrd for ScheduledTask {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledTask {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .visible_at
            .cmp(&self.visible_at)
            .then_with(|| other.task_id.cmp(&self.task_id))
    }
}

struct QueueState {
    /// Single source of truth for tasks.
    records: HashMap<TaskId, TaskRecord>,

    /// Visible Pending tasks, oldest first. May hold ids that were cancelled
    /// since; those are skipped on dequeue.
    ready: VecDeque<TaskId>,

    /// Pending tasks in backoff.
    scheduled: BinaryHeap<ScheduledTask>,

    next_token: u64,

    journal: Option<Journal>,
}

impl QueueState {
    fn new(journal: Option<Journal>) -> Self {
        Self {
            records: HashMap::new(),
            ready: VecDeque::new(),
            scheduled: BinaryHeap::new(),
            next_token: 1,
            journal,
        }
    }

    fn allocate_token(&mut self) -> LeaseToken {
        let token = LeaseToken::new(self.next_token);
        self.next_token += 1;
        token
    }

    fn persist(&mut self, task: &Task) -> Result<(), QueueError> {
        match self.journal.as_mut() {
            Some(journal) => journal.append(task),
            None => Ok(()),
        }
    }

    /// Compact when superseded snapshots outnumber live tasks. Call after
    /// `records` reflects the last append.
    fn maybe_compact(&mut self) {
        let Some(journal) = self.journal.as_ref() else {
            return;
        };
        if journal.lines() > COMPACT_RATIO * self.records.len() + COMPACT_MIN_LINES {
            self.compact_journal();
        }
    }

    /// Rewrite the journal with one snapshot per live task. On failure the
    /// old journal stays in use; it is still complete, only longer.
    fn compact_journal(&mut self) {
        let Some(journal) = self.journal.as_ref() else {
            return;
        };
        let path = journal.path().to_path_buf();
        let before = journal.lines();

        let mut tasks: Vec<Task> = self.records.values().map(|r| r.task.clone()).collect();
        tasks.sort_by_key(|t| t.id);

        match Journal::create_compacted(&path, &tasks) {
            Ok(compacted) => {
                tracing::debug!(
                    path = %path.display(),
                    before,
                    after = compacted.lines(),
                    "Compacted queue journal"
                );
                self.journal = Some(compacted);
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Journal compaction failed");
            }
        }
    }

    /// Move tasks whose backoff has elapsed to the back of the ready queue.
    fn promote_scheduled(&mut self, now: Instant) {
        while let Some(entry) = self.scheduled.peek() {
            if entry.visible_at > now {
                break;
            }
            let Some(entry) = self.scheduled.pop() else {
                break;
            };
            if let Some(record) = self.records.get_mut(&entry.task_id)
                && record.task.status == TaskStatus::Pending
                && record.visible_at == Some(entry.visible_at)
            {
                record.visible_at = None;
                self.ready.push_back(entry.task_id);
            }
        }
    }

    /// Take the oldest runnable task and lease it.
    fn lease_next(
        &mut self,
        now: Instant,
        visibility_timeout: Duration,
        clock: &dyn Clock,
    ) -> Result<Option<Lease>, QueueError> {
        while let Some(task_id) = self.ready.pop_front() {
            let Some(record) = self.records.get(&task_id) else {
                continue;
            };
            if !record.task.status.is_runnable() || record.visible_at.is_some() {
                continue;
            }

            let mut task = record.task.clone();
            task.start_attempt(clock.now());
            if let Err(e) = self.persist(&task) {
                self.ready.push_front(task_id);
                return Err(e);
            }

            let token = self.allocate_token();
            if let Some(record) = self.records.get_mut(&task_id) {
                record.task = task.clone();
                record.lease = Some(LeaseSlot {
                    token,
                    expires_at: now + visibility_timeout,
                });
            }
            self.maybe_compact();
            return Ok(Some(Lease::new(task, token)));
        }
        Ok(None)
    }

    /// Record held by `lease`, or `LeaseLost` if someone else owns it now.
    fn leased_record(&self, lease: &Lease) -> Result<&TaskRecord, QueueError> {
        let task_id = lease.task_id();
        let record = self
            .records
            .get(&task_id)
            .ok_or(QueueError::NotFound(task_id))?;
        if record.task.status != TaskStatus::InFlight || !record.holds(lease.token()) {
            return Err(QueueError::LeaseLost(task_id));
        }
        Ok(record)
    }

    /// Persist `task` and make it the current state of its record.
    fn commit(&mut self, task: Task) -> Result<Task, QueueError> {
        self.persist(&task)?;
        if let Some(record) = self.records.get_mut(&task.id) {
            record.task = task.clone();
            if record.task.status != TaskStatus::InFlight {
                record.lease = None;
            }
        }
        self.maybe_compact();
        Ok(task)
    }

    fn counts(&self) -> QueueCounts {
        let mut counts = QueueCounts::default();
        for record in self.records.values() {
            match record.task.status {
                TaskStatus::Pending => counts.pending += 1,
                TaskStatus::InFlight => counts.in_flight += 1,
                TaskStatus::Succeeded => counts.succeeded += 1,
                TaskStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }
}

/// Mutex-guarded queue with `Notify` wake-ups.
///
/// Every operation runs under one lock, so dequeue is race-free: a task is
/// marked InFlight before the lock is released and no other worker can see
/// it as Pending. With a journal, each change is appended and synced before
/// the operation returns.
pub struct InMemoryTaskQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    options: QueueOptions,
    clock: Arc<dyn Clock>,
}

impl InMemoryTaskQueue {
    /// Queue without persistence.
    pub fn new(options: QueueOptions, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(QueueState::new(None)),
            notify: Notify::new(),
            options,
            clock,
        }
    }

    /// Queue persisted to the journal at `path`, restoring whatever it
    /// already holds. Tasks that were InFlight when the journal was last
    /// written go back to Pending; their attempts still count.
    pub fn with_journal(
        path: &Path,
        options: QueueOptions,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, QueueError> {
        let mut tasks = Journal::replay(path)?;
        let now = clock.now();
        let mut recovered = 0usize;
        for task in tasks.iter_mut() {
            if task.status == TaskStatus::InFlight {
                task.requeue("worker lost on restart".to_string(), now);
                recovered += 1;
            }
        }

        let journal = Journal::create_compacted(path, &tasks)?;
        tracing::info!(
            path = %journal.path().display(),
            tasks = tasks.len(),
            recovered,
            "Opened queue journal"
        );

        let mut state = QueueState::new(Some(journal));
        for task in tasks {
            if task.status == TaskStatus::Pending {
                state.ready.push_back(task.id);
            }
            state.records.insert(task.id, TaskRecord::new(task));
        }

        Ok(Self {
            state: Mutex::new(state),
            notify: Notify::new(),
            options,
            clock,
        })
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn enqueue(&self, task: Task) -> Result<TaskId, QueueError> {
        let task_id = task.id;
        {
            let mut state = self.state.lock().await;
            if state.records.contains_key(&task_id) {
                return Err(QueueError::Duplicate(task_id));
            }
            state.persist(&task)?;
            let runnable = task.status.is_runnable();
            state.records.insert(task_id, TaskRecord::new(task));
            if runnable {
                state.ready.push_back(task_id);
            }
            state.maybe_compact();
        }
        self.notify.notify_one();
        Ok(task_id)
    }

    async fn dequeue(&self) -> Result<Lease, QueueError> {
        loop {
            let next_wake = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                state.promote_scheduled(now);

                if let Some(lease) =
                    state.lease_next(now, self.options.visibility_timeout, self.clock.as_ref())?
                {
                    return Ok(lease);
                }

                state.scheduled.peek().map(|entry| entry.visible_at)
            };

            // Wake on enqueue/requeue, or when the earliest backoff elapses.
            match next_wake {
                Some(wake_at) => {
                    tokio::select! {
                        _ = self.notify.notified() => {},
                        _ = tokio::time::sleep_until(wake_at) => {},
                    }
                }
                None => self.notify.notified().await,
            }
        }
    }

    async fn ack(&self, lease: Lease) -> Result<Task, QueueError> {
        let mut state = self.state.lock().await;
        let mut task = state.leased_record(&lease)?.task.clone();
        task.mark_succeeded(self.clock.now());
        state.commit(task)
    }

    async fn nack(
        &self,
        lease: Lease,
        error: String,
        requeue: Option<Duration>,
    ) -> Result<Task, QueueError> {
        let task = {
            let mut state = self.state.lock().await;
            let mut task = state.leased_record(&lease)?.task.clone();
            let now = self.clock.now();

            let Some(delay) = requeue else {
                task.mark_failed(error, now);
                return state.commit(task);
            };

            task.requeue(error, now);
            let task = state.commit(task)?;
            let task_id = task.id;
            if delay.is_zero() {
                state.ready.push_back(task_id);
            } else {
                let visible_at = Instant::now() + delay;
                if let Some(record) = state.records.get_mut(&task_id) {
                    record.visible_at = Some(visible_at);
                }
                state.scheduled.push(ScheduledTask {
                    visible_at,
                    task_id,
                });
            }
            task
        };

        // Outside the lock: a waiting worker re-checks ready work or its
        // next wake-up time.
        self.notify.notify_one();
        Ok(task)
    }

    async fn cancel(&self, task_id: TaskId) -> Result<Task, QueueError> {
        let mut state = self.state.lock().await;
        let record = state
            .records
            .get(&task_id)
            .ok_or(QueueError::NotFound(task_id))?;
        if record.task.status != TaskStatus::Pending {
            return Err(QueueError::NotCancellable {
                id: task_id,
                status: record.task.status,
            });
        }

        let mut task = record.task.clone();
        task.mark_failed(CANCELLED.to_string(), self.clock.now());
        let task = state.commit(task)?;
        if let Some(record) = state.records.get_mut(&task_id) {
            record.visible_at = None;
        }
        Ok(task)
    }

    async fn reap_expired(&self) -> Result<ReapReport, QueueError> {
        let mut report = ReapReport::default();
        {
            let mut state = self.state.lock().await;
            let now = Instant::now();

            let mut expired: Vec<TaskId> = state
                .records
                .values()
                .filter(|r| r.task.status == TaskStatus::InFlight && r.lease_expired(now))
                .map(|r| r.task.id)
                .collect();
            expired.sort();

            for task_id in expired {
                let Some(record) = state.records.get(&task_id) else {
                    continue;
                };
                let mut task = record.task.clone();
                let detail = format!(
                    "lease expired after {}ms (attempt {})",
                    self.options.visibility_timeout.as_millis(),
                    task.attempts
                );

                if task.attempts >= self.options.max_attempts {
                    task.mark_failed(detail, self.clock.now());
                    report.failed.push(state.commit(task)?);
                } else {
                    task.requeue(detail, self.clock.now());
                    state.commit(task)?;
                    state.ready.push_back(task_id);
                    report.requeued.push(task_id);
                }
            }
        }

        for _ in &report.requeued {
            self.notify.notify_one();
        }
        Ok(report)
    }

    async fn purge_terminal(
        &self,
        finished_before: DateTime<Utc>,
    ) -> Result<Vec<TaskId>, QueueError> {
        let mut state = self.state.lock().await;
        let mut purged: Vec<TaskId> = state
            .records
            .values()
            .filter(|r| r.task.is_terminal() && r.task.updated_at < finished_before)
            .map(|r| r.task.id)
            .collect();
        if purged.is_empty() {
            return Ok(purged);
        }
        purged.sort();

        for task_id in &purged {
            state.records.remove(task_id);
        }
        state.compact_journal();
        Ok(purged)
    }

    async fn get(&self, task_id: TaskId) -> Result<Option<Task>, QueueError> {
        let state = self.state.lock().await;
        Ok(state.records.get(&task_id).map(|r| r.task.clone()))
    }

    async fn counts(&self) -> Result<QueueCounts, QueueError> {
        let state = self.state.lock().await;
        Ok(state.counts())
    }
}
