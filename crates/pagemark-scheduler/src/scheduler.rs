//! Pending task scheduler.
//!
//! Every live task has a generation number. A timer or job only acts on its
//! task if its generation is still the current one for that page, so a
//! superseded job can never delete the record of the task that replaced it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use pagemark_storage::MetadataStore;
use pagemark_types::{PageKey, PendingIndexTask};

use crate::error::SchedulerError;
use crate::job::{IndexJob, JobError};

/// Outcome of [`PendingTaskScheduler::reconcile_on_startup`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Tasks dropped because the bookmark is gone or the page is indexed
    pub discarded: usize,
    /// Tasks already due, started immediately
    pub fired: usize,
    /// Tasks re-armed for their remaining delay
    pub rescheduled: usize,
}

struct TaskEntry {
    task: PendingIndexTask,
    generation: u64,
    /// `None` once the task is parked after a transient failure
    timer: Option<CancellationToken>,
}

struct Inner {
    metadata: Arc<dyn MetadataStore>,
    job: Arc<dyn IndexJob>,
    tasks: Mutex<HashMap<PageKey, TaskEntry>>,
    generation: AtomicU64,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

/// Converts "bookmark added" into a delayed, cancellable, durable indexing job.
#[derive(Clone)]
pub struct PendingTaskScheduler {
    inner: Arc<Inner>,
}

impl PendingTaskScheduler {
    /// Create a scheduler over the persisted task set.
    ///
    /// Persisted tasks are loaded unarmed: they count as pending and can be
    /// cancelled or superseded straight away, but only
    /// [`reconcile_on_startup`](Self::reconcile_on_startup) starts their timers.
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        job: Arc<dyn IndexJob>,
    ) -> Result<Self, SchedulerError> {
        let generation = AtomicU64::new(1);
        let tasks: HashMap<PageKey, TaskEntry> = metadata
            .load_pending_tasks()?
            .into_iter()
            .map(|task| {
                let entry = TaskEntry {
                    task,
                    generation: generation.fetch_add(1, Ordering::SeqCst),
                    timer: None,
                };
                (entry.task.key(), entry)
            })
            .collect();
        debug!(persisted = tasks.len(), "Loaded pending tasks");

        Ok(Self {
            inner: Arc::new(Inner {
                metadata,
                job,
                tasks: Mutex::new(tasks),
                generation,
                shutdown: CancellationToken::new(),
                tracker: TaskTracker::new(),
            }),
        })
    }

    /// Schedule indexing of `key` after `delay`, superseding any existing task.
    ///
    /// Returns `false` without scheduling if the page is already indexed. The
    /// task record is durable before the timer is armed.
    pub fn schedule(&self, key: PageKey, delay: Duration) -> Result<bool, SchedulerError> {
        if self.inner.shutdown.is_cancelled() {
            return Err(SchedulerError::ShutDown);
        }
        if self.inner.job.is_indexed(&key) {
            debug!(page = %key, "Page already indexed, not scheduling");
            return Ok(false);
        }

        let task = PendingIndexTask::new(&key, delay);
        let (token, generation) = self.inner.arm(key.clone(), task)?;
        info!(page = %key, delay_secs = delay.as_secs(), "Scheduled indexing");
        self.inner.clone().spawn(key, generation, token, delay);
        Ok(true)
    }

    /// Cancel the task for `key`, if any, and delete its record.
    ///
    /// Returns `false` if no task existed.
    pub fn cancel(&self, key: &PageKey) -> Result<bool, SchedulerError> {
        let mut tasks = self.inner.lock();
        let Some(entry) = tasks.remove(key) else {
            return Ok(false);
        };
        if let Some(timer) = &entry.timer {
            timer.cancel();
        }

        if let Err(e) = self.inner.persist(&tasks) {
            // Keep memory in line with disk; the record is retried at next startup
            tasks.insert(
                key.clone(),
                TaskEntry {
                    timer: None,
                    ..entry
                },
            );
            return Err(e);
        }
        info!(page = %key, "Cancelled pending indexing");
        Ok(true)
    }

    /// Recover persisted tasks after a restart.
    ///
    /// Tasks whose bookmark is gone or whose page is indexed are dropped; due
    /// tasks fire now; the rest are re-armed for their remaining delay.
    pub fn reconcile_on_startup(&self) -> Result<ReconcileReport, SchedulerError> {
        if self.inner.shutdown.is_cancelled() {
            return Err(SchedulerError::ShutDown);
        }

        let persisted = self.inner.metadata.load_pending_tasks()?;
        let now = Utc::now();
        let mut report = ReconcileReport::default();
        let mut to_spawn = Vec::new();

        {
            let mut tasks = self.inner.lock();
            for task in persisted {
                let key = task.key();
                if tasks.get(&key).is_some_and(|e| e.timer.is_some()) {
                    // Scheduled in this session already; that task is newer
                    continue;
                }
                if !self.inner.job.is_bookmarked(&key) || self.inner.job.is_indexed(&key) {
                    debug!(page = %key, "Discarding moot pending task");
                    tasks.remove(&key);
                    report.discarded += 1;
                    continue;
                }

                let remaining = task.remaining(now);
                if remaining.is_zero() {
                    report.fired += 1;
                } else {
                    report.rescheduled += 1;
                }

                let token = self.inner.shutdown.child_token();
                let generation = self.inner.next_generation();
                tasks.insert(
                    key.clone(),
                    TaskEntry {
                        task,
                        generation,
                        timer: Some(token.clone()),
                    },
                );
                to_spawn.push((key, generation, token, remaining));
            }
            self.inner.persist(&tasks)?;
        }

        for (key, generation, token, remaining) in to_spawn {
            self.inner.clone().spawn(key, generation, token, remaining);
        }

        info!(
            discarded = report.discarded,
            fired = report.fired,
            rescheduled = report.rescheduled,
            "Reconciled pending tasks"
        );
        Ok(report)
    }

    /// Current task records, ordered by page key.
    pub fn pending(&self) -> Vec<PendingIndexTask> {
        let tasks = self.inner.lock();
        let mut out: Vec<PendingIndexTask> = tasks.values().map(|e| e.task.clone()).collect();
        out.sort_by(|a, b| a.key().cmp(&b.key()));
        out
    }

    pub fn has_pending(&self, key: &PageKey) -> bool {
        self.inner.lock().contains_key(key)
    }

    /// Stop every timer and wait for running jobs to finish.
    ///
    /// Persisted records are left alone so the next startup resumes them.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
        info!("Scheduler shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, HashMap<PageKey, TaskEntry>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst)
    }

    /// Write the full task set.
    fn persist(&self, tasks: &HashMap<PageKey, TaskEntry>) -> Result<(), SchedulerError> {
        let records: Vec<PendingIndexTask> = tasks.values().map(|e| e.task.clone()).collect();
        self.metadata.replace_pending_tasks(&records)?;
        Ok(())
    }

    /// Install a new task for `key`, cancelling the one it supersedes.
    fn arm(
        &self,
        key: PageKey,
        task: PendingIndexTask,
    ) -> Result<(CancellationToken, u64), SchedulerError> {
        let token = self.shutdown.child_token();
        let generation = self.next_generation();
        let mut tasks = self.lock();
        let previous = tasks.insert(
            key.clone(),
            TaskEntry {
                task,
                generation,
                timer: Some(token.clone()),
            },
        );

        if let Err(e) = self.persist(&tasks) {
            match previous {
                Some(previous) => tasks.insert(key, previous),
                None => tasks.remove(&key),
            };
            return Err(e);
        }

        if let Some(timer) = previous.and_then(|p| p.timer) {
            debug!(page = %key, "Superseded existing task");
            timer.cancel();
        }
        Ok((token, generation))
    }

    fn generation_of(&self, key: &PageKey) -> Option<u64> {
        self.lock().get(key).map(|e| e.generation)
    }

    fn spawn(self: Arc<Self>, key: PageKey, generation: u64, token: CancellationToken, delay: Duration) {
        let tracker = self.tracker.clone();
        tracker.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!(page = %key, "Timer cancelled");
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }
            self.fire(key, generation, token).await;
        });
    }

    async fn fire(&self, key: PageKey, generation: u64, token: CancellationToken) {
        if token.is_cancelled() || self.generation_of(&key) != Some(generation) {
            return;
        }

        // Re-validate now; state captured at schedule time is not trusted
        if !self.job.is_bookmarked(&key) || self.job.is_indexed(&key) {
            debug!(page = %key, "Task moot at fire time");
            self.complete(&key, generation);
            return;
        }

        debug!(page = %key, "Running indexing job");
        match self.job.run(&key, &token).await {
            Ok(()) => self.complete(&key, generation),
            Err(JobError::Cancelled) if !token.is_cancelled() => {
                debug!(page = %key, "Task became moot while running");
                self.complete(&key, generation);
            }
            Err(JobError::Cancelled) => {
                debug!(page = %key, "Job observed cancellation");
            }
            Err(JobError::Permanent(reason)) => {
                warn!(page = %key, error = %reason, "Indexing failed permanently, dropping task");
                self.complete(&key, generation);
            }
            Err(JobError::Transient(reason)) => {
                warn!(page = %key, error = %reason, "Indexing failed, parking task until next startup");
                self.park(&key, generation);
            }
        }
    }

    /// Delete the record if `generation` is still current.
    fn complete(&self, key: &PageKey, generation: u64) {
        let mut tasks = self.lock();
        if tasks.get(key).map(|e| e.generation) != Some(generation) {
            return;
        }
        tasks.remove(key);
        if let Err(e) = self.persist(&tasks) {
            error!(page = %key, error = %e, "Failed to delete completed task record");
        }
    }

    /// Keep the record for the next startup, counting the failed attempt.
    fn park(&self, key: &PageKey, generation: u64) {
        let mut tasks = self.lock();
        let Some(entry) = tasks.get_mut(key) else {
            return;
        };
        if entry.generation != generation {
            return;
        }
        entry.task.attempts += 1;
        entry.timer = None;
        if let Err(e) = self.persist(&tasks) {
            error!(page = %key, error = %e, "Failed to persist parked task");
        }
    }
}
