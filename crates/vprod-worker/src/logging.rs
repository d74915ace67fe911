//! Structured task logging.
//!
//! Every line carries the task id and the id of the worker running it, so a
//! single task can be followed across interleaved worker output.

use tracing::{error, info, warn, Span};
use vprod_models::TaskId;

/// Lifecycle logger for one task on one worker.
#[derive(Debug, Clone)]
pub struct TaskLogger {
    task_id: String,
    worker_id: String,
}

impl TaskLogger {
    pub fn new(task_id: &TaskId, worker_id: &str) -> Self {
        Self {
            task_id: task_id.to_string(),
            worker_id: worker_id.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            task_id = %self.task_id,
            worker_id = %self.worker_id,
            "Task started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            task_id = %self.task_id,
            worker_id = %self.worker_id,
            "Task progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            task_id = %self.task_id,
            worker_id = %self.worker_id,
            "Task warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            task_id = %self.task_id,
            worker_id = %self.worker_id,
            "Task error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            task_id = %self.task_id,
            worker_id = %self.worker_id,
            "Task completed: {}", message
        );
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Span the pipeline runs in; nested logs inherit its fields.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "task",
            task_id = %self.task_id,
            worker_id = %self.worker_id
        )
    }
}
