//! Claim ordering.
//!
//! Workers pull: each snapshot of pending tasks is ordered by priority
//! (`high` first), then by age, and the worker claims the first task it can.
//! The store's claim is the exclusivity boundary, so losing a race to another
//! worker just moves on to the next candidate.

use std::sync::Arc;

use tracing::debug;
use vprod_models::{Task, TaskStatus};
use vprod_store::{StoreResult, TaskStore};

/// Order pending tasks for claiming: priority rank, then `created_at`
/// ascending, then insertion order.
pub fn claim_order(mut pending: Vec<Task>) -> Vec<Task> {
    // Listings are newest first; flip to insertion order before the stable sort.
    pending.reverse();
    pending.sort_by_key(|task| (task.priority.rank(), task.created_at));
    pending
}

#[derive(Clone)]
pub struct Scheduler {
    store: Arc<dyn TaskStore>,
}

impl Scheduler {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }

    /// Claim the highest-ranked pending task, if any.
    pub async fn claim_next(&self) -> StoreResult<Option<Task>> {
        let pending = self.store.list_by_status(TaskStatus::Pending).await?;
        for candidate in claim_order(pending) {
            if let Some(task) = self.store.claim(&candidate.id).await? {
                return Ok(Some(task));
            }
            debug!(task_id = %candidate.id, "Task claimed elsewhere, trying next");
        }
        Ok(None)
    }
}
