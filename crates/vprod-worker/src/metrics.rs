//! Worker metrics.

use metrics::{counter, histogram};

use crate::error::FailureKind;

/// Metric names as constants for consistency.
pub mod names {
    pub const TASKS_COMPLETED_TOTAL: &str = "vprod_tasks_completed_total";
    pub const TASKS_FAILED_TOTAL: &str = "vprod_tasks_failed_total";
    pub const IR_FALLBACK_TOTAL: &str = "vprod_ir_fallback_total";
    pub const TASK_DURATION_SECONDS: &str = "vprod_task_duration_seconds";
}

pub fn record_task_completed(duration_secs: f64) {
    counter!(names::TASKS_COMPLETED_TOTAL).increment(1);
    histogram!(names::TASK_DURATION_SECONDS).record(duration_secs);
}

pub fn record_task_failed(kind: FailureKind, duration_secs: f64) {
    counter!(names::TASKS_FAILED_TOTAL, "kind" => kind.as_str()).increment(1);
    histogram!(names::TASK_DURATION_SECONDS).record(duration_secs);
}

/// The planner kept the template instead of a completion result.
pub fn record_ir_fallback(reason: &'static str) {
    counter!(names::IR_FALLBACK_TOTAL, "reason" => reason).increment(1);
}

/// Processing tasks failed because their worker went away.
pub fn record_tasks_interrupted(count: usize) {
    counter!(names::TASKS_FAILED_TOTAL, "kind" => FailureKind::Interrupted.as_str())
        .increment(count as u64);
}
