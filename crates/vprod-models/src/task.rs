//! Task records for the scheduler and the task store.
//!
//! A [`Task`] owns its own state machine: every mutation goes through a method
//! that checks the transition and bumps `updated_at`, so the store only has to
//! serialize and persist.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::ir::{lenient, IrDocument};
use crate::media::{MediaSegment, VideoInfo};

/// Unique identifier for a task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    /// Generate a new random task ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Task lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting for a worker to claim it
    #[default]
    Pending,
    /// Claimed by exactly one worker
    Processing,
    /// Finished with a result
    Completed,
    /// Finished with an error
    Failed,
    /// Canceled by an external actor
    Canceled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Canceled => "canceled",
        }
    }

    /// Terminal states accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Canceled
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "processing" => Ok(TaskStatus::Processing),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "canceled" | "cancelled" => Ok(TaskStatus::Canceled),
            other => Err(format!("unknown task status: {}", other)),
        }
    }
}

/// Scheduling priority. Declaration order is scheduling order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    High,
    #[default]
    Normal,
    Low,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::High => "high",
            TaskPriority::Normal => "normal",
            TaskPriority::Low => "low",
        }
    }

    /// Numeric rank used for ordering (lower runs first).
    pub fn rank(&self) -> u8 {
        match self {
            TaskPriority::High => 0,
            TaskPriority::Normal => 1,
            TaskPriority::Low => 2,
        }
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TaskPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "high" => Ok(TaskPriority::High),
            "normal" => Ok(TaskPriority::Normal),
            "low" => Ok(TaskPriority::Low),
            other => Err(format!("unknown task priority: {}", other)),
        }
    }
}

/// Discriminant of [`TaskKind`], used for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskType {
    #[serde(alias = "produce_video")]
    ProduceVideo,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::ProduceVideo => "produce-video",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "produce-video" | "produce_video" => Ok(TaskType::ProduceVideo),
            other => Err(format!("unknown task type: {}", other)),
        }
    }
}

/// Parameters of a `produce-video` task.
///
/// There is deliberately no priority here: the task-level
/// [`Task::priority`] is the only one the scheduler reads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProduceVideoParams {
    /// Natural-language production requirement (required at execution time)
    #[serde(default, alias = "requirement")]
    pub user_requirement: String,

    /// Brand tags
    #[serde(default)]
    pub brands: Vec<String>,

    /// Model tags
    #[serde(default)]
    pub models: Vec<String>,

    /// Target platforms
    #[serde(default)]
    pub target_platforms: Vec<String>,

    /// Target duration in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_duration: Option<f64>,

    /// Source media the segments are cut from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_media: Option<PathBuf>,

    /// Pre-built IR, used verbatim when present
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub ir_preview: Option<IrDocument>,
}

impl ProduceVideoParams {
    pub fn new(user_requirement: impl Into<String>) -> Self {
        Self {
            user_requirement: user_requirement.into(),
            ..Default::default()
        }
    }

    pub fn with_source_media(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_media = Some(path.into());
        self
    }

    pub fn with_target_duration(mut self, seconds: f64) -> Self {
        self.target_duration = Some(seconds);
        self
    }

    pub fn with_brands(mut self, brands: Vec<String>) -> Self {
        self.brands = brands;
        self
    }

    pub fn with_ir_preview(mut self, ir: IrDocument) -> Self {
        self.ir_preview = Some(ir);
        self
    }
}

/// Kind of work a task carries, with its typed parameters.
///
/// Persisted as `"task_type"` + `"params"` next to the other task fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "task_type", content = "params", rename_all = "kebab-case")]
pub enum TaskKind {
    #[serde(alias = "produce_video")]
    ProduceVideo(ProduceVideoParams),
}

impl TaskKind {
    pub fn task_type(&self) -> TaskType {
        match self {
            TaskKind::ProduceVideo(_) => TaskType::ProduceVideo,
        }
    }
}

/// Output of a completed task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub success: bool,
    pub project_id: String,
    pub project_name: String,
    /// Directory holding every artifact of this task
    pub output_dir: PathBuf,
    /// Published segments, in request order
    pub segments: Vec<MediaSegment>,
    pub total_segments: usize,
    /// The IR that was executed
    pub ir_file: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_info: Option<VideoInfo>,
}

/// Rejected status change.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid task transition: {from} -> {to}")]
pub struct TransitionError {
    pub from: TaskStatus,
    pub to: TaskStatus,
}

/// A unit of schedulable work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(rename = "task_id")]
    pub id: TaskId,

    #[serde(flatten)]
    pub kind: TaskKind,

    #[serde(default)]
    pub status: TaskStatus,

    /// Progress (0-100)
    #[serde(default)]
    pub progress: u8,

    #[serde(default)]
    pub priority: TaskPriority,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    /// Present only when `status == completed`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<TaskResult>,

    /// Human-readable failure reason, present only when `status == failed`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Task {
    /// Create a new pending task.
    pub fn new(kind: TaskKind, priority: TaskPriority) -> Self {
        let now = Utc::now();
        Self {
            id: TaskId::new(),
            kind,
            status: TaskStatus::Pending,
            progress: 0,
            priority,
            created_at: now,
            updated_at: now,
            result: None,
            error: None,
        }
    }

    /// Use a caller-chosen ID instead of a generated one.
    pub fn with_id(mut self, id: TaskId) -> Self {
        self.id = id;
        self
    }

    pub fn task_type(&self) -> TaskType {
        self.kind.task_type()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn reject(&self, to: TaskStatus) -> TransitionError {
        TransitionError {
            from: self.status,
            to,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Claim the task: `pending -> processing`. The only way out of pending
    /// into processing.
    pub fn claim(&mut self) -> Result<(), TransitionError> {
        if self.status != TaskStatus::Pending {
            return Err(self.reject(TaskStatus::Processing));
        }
        self.status = TaskStatus::Processing;
        self.touch();
        Ok(())
    }

    /// Generic status update.
    ///
    /// Accepts `processing -> processing` (with optional progress),
    /// `pending -> pending` and `pending|processing -> canceled`. Completion
    /// and failure carry payloads and go through [`Task::complete`] and
    /// [`Task::fail`]; claiming goes through [`Task::claim`].
    pub fn set_status(
        &mut self,
        status: TaskStatus,
        progress: Option<u8>,
    ) -> Result<(), TransitionError> {
        match (self.status, status) {
            (TaskStatus::Processing, TaskStatus::Processing) => {
                if let Some(p) = progress {
                    self.raise_progress(p);
                }
            }
            (TaskStatus::Pending, TaskStatus::Pending) => {}
            (TaskStatus::Pending | TaskStatus::Processing, TaskStatus::Canceled) => {
                self.status = TaskStatus::Canceled;
            }
            _ => return Err(self.reject(status)),
        }
        self.touch();
        Ok(())
    }

    /// Update progress while processing. Returns `false` (and changes
    /// nothing) when the task is not processing.
    pub fn set_progress(&mut self, progress: u8) -> bool {
        if self.status != TaskStatus::Processing {
            return false;
        }
        self.raise_progress(progress);
        self.touch();
        true
    }

    fn raise_progress(&mut self, progress: u8) {
        self.progress = self.progress.max(progress.min(100));
    }

    /// Mark completed with its result.
    pub fn complete(&mut self, result: TaskResult) -> Result<(), TransitionError> {
        if self.status != TaskStatus::Processing {
            return Err(self.reject(TaskStatus::Completed));
        }
        self.status = TaskStatus::Completed;
        self.progress = 100;
        self.result = Some(result);
        self.error = None;
        self.touch();
        Ok(())
    }

    /// Mark failed, keeping the last progress value.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), TransitionError> {
        if self.status != TaskStatus::Processing {
            return Err(self.reject(TaskStatus::Failed));
        }
        self.status = TaskStatus::Failed;
        self.error = Some(error.into());
        self.touch();
        Ok(())
    }

    /// Cancel a pending or processing task.
    pub fn cancel(&mut self) -> Result<(), TransitionError> {
        self.set_status(TaskStatus::Canceled, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> Task {
        Task::new(
            TaskKind::ProduceVideo(ProduceVideoParams::new("30s highlight reel")),
            TaskPriority::Normal,
        )
    }

    fn result() -> TaskResult {
        TaskResult {
            success: true,
            project_id: "p".into(),
            project_name: "ir_video_p".into(),
            output_dir: PathBuf::from("/tmp/out"),
            segments: Vec::new(),
            total_segments: 0,
            ir_file: PathBuf::from("/tmp/out/ir.json"),
            source_info: None,
        }
    }

    #[test]
    fn test_new_task_is_pending() {
        let t = task();
        assert_eq!(t.status, TaskStatus::Pending);
        assert_eq!(t.progress, 0);
        assert!(t.result.is_none());
        assert_eq!(t.created_at, t.updated_at);
    }

    #[test]
    fn test_claim_is_exclusive() {
        let mut t = task();
        assert!(t.claim().is_ok());
        assert_eq!(t.status, TaskStatus::Processing);
        assert_eq!(
            t.claim(),
            Err(TransitionError {
                from: TaskStatus::Processing,
                to: TaskStatus::Processing
            })
        );
    }

    #[test]
    fn test_set_status_cannot_claim() {
        let mut t = task();
        assert!(t.set_status(TaskStatus::Processing, Some(10)).is_err());
        assert_eq!(t.status, TaskStatus::Pending);
    }

    #[test]
    fn test_progress_is_monotonic_and_clamped() {
        let mut t = task();
        assert!(!t.set_progress(10));
        t.claim().unwrap();
        assert!(t.set_progress(40));
        assert!(t.set_progress(20));
        assert_eq!(t.progress, 40);
        t.set_status(TaskStatus::Processing, Some(250)).unwrap();
        assert_eq!(t.progress, 100);
    }

    #[test]
    fn test_complete_sets_result_and_progress() {
        let mut t = task();
        assert!(t.complete(result()).is_err());
        t.claim().unwrap();
        t.complete(result()).unwrap();
        assert_eq!(t.status, TaskStatus::Completed);
        assert_eq!(t.progress, 100);
        assert!(t.result.is_some());
    }

    #[test]
    fn test_fail_keeps_progress() {
        let mut t = task();
        t.claim().unwrap();
        t.set_progress(20);
        t.fail("boom").unwrap();
        assert_eq!(t.status, TaskStatus::Failed);
        assert_eq!(t.progress, 20);
        assert_eq!(t.error.as_deref(), Some("boom"));
        assert!(t.result.is_none());
    }

    #[test]
    fn test_terminal_states_reject_everything() {
        let mut t = task();
        t.cancel().unwrap();
        assert!(t.is_terminal());
        assert!(t.claim().is_err());
        assert!(t.cancel().is_err());
        assert!(t.fail("late").is_err());
        assert!(t.complete(result()).is_err());
        assert!(!t.set_progress(50));
        assert_eq!(t.status, TaskStatus::Canceled);
    }

    #[test]
    fn test_priority_ordering() {
        let mut priorities = vec![TaskPriority::Low, TaskPriority::High, TaskPriority::Normal];
        priorities.sort();
        assert_eq!(
            priorities,
            vec![TaskPriority::High, TaskPriority::Normal, TaskPriority::Low]
        );
        assert_eq!("HIGH".parse::<TaskPriority>(), Ok(TaskPriority::High));
    }

    #[test]
    fn test_task_serialization_shape() {
        let t = task();
        let json = serde_json::to_value(&t).unwrap();
        assert_eq!(json["task_type"], "produce-video");
        assert_eq!(json["params"]["user_requirement"], "30s highlight reel");
        assert_eq!(json["status"], "pending");
        assert_eq!(json["priority"], "normal");
        assert!(json.get("task_id").is_some());
        assert!(json.get("result").is_none());

        let back: Task = serde_json::from_value(json).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn test_params_accept_requirement_alias() {
        let kind: TaskKind = serde_json::from_value(serde_json::json!({
            "task_type": "produce_video",
            "params": { "requirement": "30s highlight reel", "priority": "high" }
        }))
        .unwrap();
        let TaskKind::ProduceVideo(params) = kind;
        assert_eq!(params.user_requirement, "30s highlight reel");
        assert!(params.ir_preview.is_none());
    }
}
