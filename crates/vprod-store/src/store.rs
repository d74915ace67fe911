//! The `TaskStore` contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use vprod_models::{Task, TaskId, TaskKind, TaskPriority, TaskResult, TaskStatus, TaskType};

use crate::error::StoreResult;

/// Listing filter. Empty fields match everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub task_type: Option<TaskType>,
}

impl TaskFilter {
    pub fn matches(&self, task: &Task) -> bool {
        self.status.map_or(true, |s| task.status == s)
            && self.task_type.map_or(true, |t| task.task_type() == t)
    }
}

/// Durable task records.
///
/// Every operation is linearizable per task id, also across processes
/// sharing the same backing storage, and every mutation is persisted before
/// it returns; a failed write leaves the store unchanged.
/// Operations that address a task by id return `false` / `None` for unknown
/// ids. Status changes that the task's state machine rejects return
/// [`StoreError::InvalidTransition`](crate::StoreError::InvalidTransition).
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Create a pending task with a fresh id.
    async fn create(&self, kind: TaskKind, priority: TaskPriority) -> StoreResult<Task> {
        self.insert(Task::new(kind, priority)).await
    }

    /// Insert a pre-built task. Fails if its id is taken.
    async fn insert(&self, task: Task) -> StoreResult<Task>;

    async fn get(&self, id: &TaskId) -> StoreResult<Option<Task>>;

    /// Matching tasks, newest `created_at` first.
    async fn list(&self, filter: TaskFilter) -> StoreResult<Vec<Task>>;

    async fn list_by_status(&self, status: TaskStatus) -> StoreResult<Vec<Task>> {
        self.list(TaskFilter {
            status: Some(status),
            ..Default::default()
        })
        .await
    }

    async fn list_by_type(&self, task_type: TaskType) -> StoreResult<Vec<Task>> {
        self.list(TaskFilter {
            task_type: Some(task_type),
            ..Default::default()
        })
        .await
    }

    async fn list_all(&self) -> StoreResult<Vec<Task>> {
        self.list(TaskFilter::default()).await
    }

    /// Generic status change, optionally raising progress.
    ///
    /// `pending -> processing` is only possible through [`TaskStore::claim`];
    /// completion and failure go through [`TaskStore::set_result`] and
    /// [`TaskStore::fail`].
    async fn update_status(
        &self,
        id: &TaskId,
        status: TaskStatus,
        progress: Option<u8>,
    ) -> StoreResult<bool>;

    /// Raise progress of a processing task. `false` for unknown ids and for
    /// tasks that are not processing.
    async fn update_progress(&self, id: &TaskId, progress: u8) -> StoreResult<bool>;

    /// Complete a processing task with its result (progress becomes 100).
    async fn set_result(&self, id: &TaskId, result: TaskResult) -> StoreResult<bool>;

    /// Atomically move a pending task to processing.
    ///
    /// Returns the claimed task to exactly one caller; everyone else (and
    /// unknown ids) gets `None`.
    async fn claim(&self, id: &TaskId) -> StoreResult<Option<Task>>;

    /// Fail a processing task with a human-readable reason.
    async fn fail(&self, id: &TaskId, error: &str) -> StoreResult<bool>;

    /// Fail every processing task whose `updated_at` is older than
    /// `stale_before`, in one atomic step. Returns the failed ids.
    async fn fail_stale(
        &self,
        stale_before: DateTime<Utc>,
        error: &str,
    ) -> StoreResult<Vec<TaskId>>;

    /// Cancel a pending or processing task.
    async fn cancel(&self, id: &TaskId) -> StoreResult<bool> {
        self.update_status(id, TaskStatus::Canceled, None).await
    }

    async fn delete(&self, id: &TaskId) -> StoreResult<bool>;
}
