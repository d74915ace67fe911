//! Worker loop and pool.
//!
//! Each worker runs one task at a time through
//! `idle → claiming → executing → publishing → idle`. The pool owns the
//! shutdown signal: workers stop polling once it fires, and an in-flight task
//! is given up to the shutdown timeout to finish.
//!
//! A running task's `updated_at` is refreshed every heartbeat interval. The
//! pool fails processing tasks whose `updated_at` is older than the stale
//! task timeout, which covers workers that crashed, were aborted, or could
//! not publish.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};
use vprod_models::{Task, TaskId, TaskResult};
use vprod_store::{StoreError, StoreResult, TaskStore};

use crate::completion::TextCompletion;
use crate::config::WorkerConfig;
use crate::error::{FailureKind, WorkerError, WorkerResult};
use crate::logging::TaskLogger;
use crate::metrics;
use crate::pipeline::Pipeline;
use crate::scheduler::Scheduler;

/// What a worker is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Idle,
    Claiming,
    Executing,
    Publishing,
    Stopped,
}

/// A single pull-based worker.
pub struct Worker {
    id: String,
    store: Arc<dyn TaskStore>,
    scheduler: Scheduler,
    pipeline: Pipeline,
    poll_interval: Duration,
    error_backoff: Duration,
    heartbeat_interval: Duration,
    publish_attempts: u32,
    publish_retry_delay: Duration,
    state: watch::Sender<WorkerState>,
    current: watch::Sender<Option<TaskId>>,
}

impl Worker {
    pub fn new(
        id: impl Into<String>,
        config: &WorkerConfig,
        store: Arc<dyn TaskStore>,
        completion: Option<Arc<dyn TextCompletion>>,
    ) -> Self {
        let (state, _) = watch::channel(WorkerState::Idle);
        let (current, _) = watch::channel(None);
        Self {
            id: id.into(),
            scheduler: Scheduler::new(Arc::clone(&store)),
            pipeline: Pipeline::new(
                Arc::clone(&store),
                completion,
                config.extraction.clone(),
                config.output_dir.clone(),
            ),
            store,
            poll_interval: config.poll_interval,
            error_backoff: config.error_backoff,
            heartbeat_interval: config.heartbeat_interval(),
            publish_attempts: config.publish_attempts.max(1),
            publish_retry_delay: config.publish_retry_delay,
            state,
            current,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    /// The task this worker has claimed and not yet published, if any.
    pub fn current_task(&self) -> Option<TaskId> {
        self.current.borrow().clone()
    }

    fn set_state(&self, state: WorkerState) {
        self.state.send_replace(state);
    }

    /// Poll until `shutdown` flips to `true` (or its sender is dropped).
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(worker_id = %self.id, "Worker started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let delay = match self.run_once().await {
                Ok(true) => continue,
                Ok(false) => self.poll_interval,
                Err(e) => {
                    error!(worker_id = %self.id, "Worker loop error: {}", e);
                    self.error_backoff
                }
            };

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.set_state(WorkerState::Stopped);
        info!(worker_id = %self.id, "Worker stopped");
    }

    /// Claim and run at most one task.
    ///
    /// Returns `Ok(false)` when nothing was pending. Errors are store
    /// failures while claiming, or while publishing once every attempt is
    /// used up; task failures are published, not returned.
    pub async fn run_once(&self) -> WorkerResult<bool> {
        self.set_state(WorkerState::Claiming);
        let task = match self.scheduler.claim_next().await {
            Ok(Some(task)) => task,
            Ok(None) => {
                self.set_state(WorkerState::Idle);
                return Ok(false);
            }
            Err(e) => {
                self.set_state(WorkerState::Idle);
                return Err(e.into());
            }
        };

        self.current.send_replace(Some(task.id.clone()));
        self.set_state(WorkerState::Executing);
        let logger = TaskLogger::new(&task.id, &self.id);
        logger.log_start(&format!(
            "{} (priority {})",
            task.task_type(),
            task.priority
        ));

        let beat = AbortOnDrop(tokio::spawn(heartbeat(
            Arc::clone(&self.store),
            task.id.clone(),
            self.heartbeat_interval,
        )));
        let started = Instant::now();
        let outcome = self
            .pipeline
            .execute(&task, &logger)
            .instrument(logger.create_span())
            .await;
        drop(beat);

        self.set_state(WorkerState::Publishing);
        let published = self
            .publish(&task, outcome, &logger, started.elapsed().as_secs_f64())
            .await;
        self.current.send_replace(None);
        self.set_state(WorkerState::Idle);

        published.map(|_| true)
    }

    async fn publish(
        &self,
        task: &Task,
        outcome: WorkerResult<TaskResult>,
        logger: &TaskLogger,
        elapsed_secs: f64,
    ) -> WorkerResult<()> {
        let written = match outcome {
            Ok(result) => {
                let segments = result.total_segments;
                let written = self
                    .with_retries(logger, || self.store.set_result(&task.id, result.clone()))
                    .await;
                if matches!(written, Ok(true)) {
                    metrics::record_task_completed(elapsed_secs);
                    logger.log_completion(&format!(
                        "{} segment(s) in {:.1}s",
                        segments, elapsed_secs
                    ));
                }
                written
            }
            Err(err) => {
                let kind = err.failure_kind();
                let message = format!("{}: {}", kind, err);
                logger.log_error(&message);
                let written = self
                    .with_retries(logger, || self.store.fail(&task.id, &message))
                    .await;
                if matches!(written, Ok(true)) {
                    metrics::record_task_failed(kind, elapsed_secs);
                }
                written
            }
        };

        match written {
            Ok(true) => Ok(()),
            Ok(false) => {
                logger.log_warning("Task was deleted while running, outcome dropped");
                Ok(())
            }
            Err(StoreError::InvalidTransition(e)) => {
                logger.log_warning(&format!("Outcome discarded ({})", e));
                Ok(())
            }
            Err(e) => {
                logger.log_error(&format!(
                    "Could not publish outcome after {} attempt(s): {}",
                    self.publish_attempts, e
                ));
                Err(WorkerError::from(e))
            }
        }
    }

    /// Retry `write` while the store is unavailable, doubling the delay.
    async fn with_retries<F, Fut>(&self, logger: &TaskLogger, mut write: F) -> StoreResult<bool>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<bool>>,
    {
        let mut delay = self.publish_retry_delay;
        let mut attempt = 1;
        loop {
            match write().await {
                Err(e) if e.is_unavailable() && attempt < self.publish_attempts => {
                    logger.log_warning(&format!(
                        "Publishing outcome failed (attempt {}/{}): {}",
                        attempt, self.publish_attempts, e
                    ));
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                    attempt += 1;
                }
                written => return written,
            }
        }
    }
}

/// Aborts the task when dropped, including when the owning future is.
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Refresh the task's `updated_at` until it stops processing. Progress never
/// decreases, so writing 0 leaves it as it is.
async fn heartbeat(store: Arc<dyn TaskStore>, id: TaskId, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        match store.update_progress(&id, 0).await {
            Ok(true) => debug!(task_id = %id, "Heartbeat"),
            Ok(false) => break,
            Err(e) => warn!(task_id = %id, "Heartbeat failed: {}", e),
        }
    }
}

/// Fail processing tasks nobody has updated within `stale_after`.
pub async fn fail_stale_tasks(
    store: &dyn TaskStore,
    stale_after: Duration,
) -> WorkerResult<Vec<TaskId>> {
    let cutoff = chrono::Duration::from_std(stale_after)
        .ok()
        .and_then(|age| Utc::now().checked_sub_signed(age))
        .unwrap_or_else(Utc::now);
    let message = format!(
        "{}: no progress from its worker for {}s",
        FailureKind::Interrupted,
        stale_after.as_secs()
    );

    let failed = store.fail_stale(cutoff, &message).await?;
    if !failed.is_empty() {
        metrics::record_tasks_interrupted(failed.len());
    }
    Ok(failed)
}

async fn reap_stale(
    store: Arc<dyn TaskStore>,
    stale_after: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval((stale_after / 2).max(Duration::from_millis(10)));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = fail_stale_tasks(store.as_ref(), stale_after).await {
                    warn!("Stale task sweep failed: {}", e);
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

/// A set of workers sharing one store and one shutdown signal.
pub struct WorkerPool {
    workers: Vec<Arc<Worker>>,
    store: Arc<dyn TaskStore>,
    shutdown: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    reaper: Mutex<Option<JoinHandle<()>>>,
    shutdown_timeout: Duration,
}

impl WorkerPool {
    /// Spawn `config.worker_count` workers and the stale task sweep.
    ///
    /// With more than one worker, ids are `<worker_id>-<n>`.
    pub fn spawn(
        config: &WorkerConfig,
        store: Arc<dyn TaskStore>,
        completion: Option<Arc<dyn TextCompletion>>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        let count = config.worker_count.max(1);

        let workers: Vec<Arc<Worker>> = (0..count)
            .map(|n| {
                let id = if count == 1 {
                    config.worker_id.clone()
                } else {
                    format!("{}-{}", config.worker_id, n + 1)
                };
                Arc::new(Worker::new(
                    id,
                    config,
                    Arc::clone(&store),
                    completion.clone(),
                ))
            })
            .collect();

        let handles = workers
            .iter()
            .map(|worker| {
                let worker = Arc::clone(worker);
                let shutdown_rx = shutdown.subscribe();
                tokio::spawn(async move { worker.run(shutdown_rx).await })
            })
            .collect();

        let reaper = tokio::spawn(reap_stale(
            Arc::clone(&store),
            config.stale_task_timeout,
            shutdown.subscribe(),
        ));

        info!(
            "Started {} worker(s), output directory {}",
            count,
            config.output_dir.display()
        );

        Self {
            workers,
            store,
            shutdown,
            handles: Mutex::new(handles),
            reaper: Mutex::new(Some(reaper)),
            shutdown_timeout: config.shutdown_timeout,
        }
    }

    /// Current state of every worker, by id.
    pub fn states(&self) -> Vec<(String, WorkerState)> {
        self.workers
            .iter()
            .map(|w| (w.id().to_string(), w.state()))
            .collect()
    }

    /// Stop polling and wait for in-flight tasks, up to the shutdown timeout.
    ///
    /// Tasks still running when the timeout expires are aborted and failed
    /// as interrupted.
    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(true);

        let reaper = match self.reaper.lock() {
            Ok(mut reaper) => reaper.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(reaper) = reaper {
            reaper.abort();
        }

        let handles = match self.handles.lock() {
            Ok(mut handles) => std::mem::take(&mut *handles),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        if handles.is_empty() {
            return;
        }

        info!("Waiting for {} worker(s) to drain", handles.len());
        let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();
        let drained = tokio::time::timeout(
            self.shutdown_timeout,
            futures::future::join_all(handles),
        )
        .await;

        if drained.is_err() {
            warn!(
                "Workers did not drain within {:?}, aborting",
                self.shutdown_timeout
            );
            for abort in aborts {
                abort.abort();
            }
            self.fail_abandoned().await;
        }
        info!("Worker pool stopped");
    }

    async fn fail_abandoned(&self) {
        let message = format!(
            "{}: worker shut down before the task finished",
            FailureKind::Interrupted
        );
        for worker in &self.workers {
            let Some(id) = worker.current_task() else {
                continue;
            };
            match self.store.fail(&id, &message).await {
                Ok(true) => {
                    metrics::record_tasks_interrupted(1);
                    warn!(task_id = %id, worker_id = %worker.id(), "Failed abandoned task");
                }
                Ok(false) | Err(StoreError::InvalidTransition(_)) => {}
                Err(e) => error!(task_id = %id, "Could not fail abandoned task: {}", e),
            }
        }
    }
}
