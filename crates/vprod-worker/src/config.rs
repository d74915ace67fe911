//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use vprod_media::ExtractionConfig;

/// Text-completion collaborator settings.
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    /// Gemini API key; without one the planner always uses the template
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    /// Bound on a single completion call
    pub timeout: Duration,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gemini-1.5-flash".to_string(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            timeout: Duration::from_secs(120),
        }
    }
}

impl CompletionConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_key: std::env::var("GEMINI_API_KEY")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            model: std::env::var("GEMINI_MODEL").unwrap_or(defaults.model),
            base_url: std::env::var("GEMINI_BASE_URL").unwrap_or(defaults.base_url),
            timeout: Duration::from_secs(
                std::env::var("COMPLETION_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(120),
            ),
        }
    }
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Identifier included in every log line of this process
    pub worker_id: String,
    /// Number of worker loops sharing the store
    pub worker_count: usize,
    /// Root of the per-task output directories
    pub output_dir: PathBuf,
    /// Backing file of the task store
    pub tasks_file: PathBuf,
    /// Sleep between polls when no task is pending
    pub poll_interval: Duration,
    /// Sleep after an unexpected loop error
    pub error_backoff: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// A processing task not updated for this long is failed as interrupted
    pub stale_task_timeout: Duration,
    /// Attempts at writing a task's outcome before giving up
    pub publish_attempts: u32,
    /// Delay before the second attempt, doubled after each retry
    pub publish_retry_delay: Duration,
    pub extraction: ExtractionConfig,
    pub completion: CompletionConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: default_worker_id(),
            worker_count: 1,
            output_dir: PathBuf::from("./output"),
            tasks_file: PathBuf::from("./data/tasks.json"),
            poll_interval: Duration::from_secs(5),
            error_backoff: Duration::from_secs(10),
            shutdown_timeout: Duration::from_secs(60),
            stale_task_timeout: Duration::from_secs(600),
            publish_attempts: 4,
            publish_retry_delay: Duration::from_millis(500),
            extraction: ExtractionConfig::default(),
            completion: CompletionConfig::default(),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            worker_id: std::env::var("WORKER_ID")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(default_worker_id),
            worker_count: std::env::var("WORKER_COUNT")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(1),
            output_dir: std::env::var("WORKER_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./output")),
            tasks_file: std::env::var("TASKS_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data/tasks.json")),
            poll_interval: Duration::from_secs(
                std::env::var("WORKER_POLL_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            ),
            error_backoff: Duration::from_secs(
                std::env::var("WORKER_ERROR_BACKOFF_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
            ),
            shutdown_timeout: Duration::from_secs(
                std::env::var("WORKER_SHUTDOWN_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            ),
            stale_task_timeout: Duration::from_secs(
                std::env::var("WORKER_STALE_TASK_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .filter(|n| *n > 0)
                    .unwrap_or(600),
            ),
            publish_attempts: std::env::var("WORKER_PUBLISH_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(4),
            publish_retry_delay: Duration::from_millis(
                std::env::var("WORKER_PUBLISH_RETRY_DELAY_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(500),
            ),
            extraction: ExtractionConfig::from_env(),
            completion: CompletionConfig::from_env(),
        }
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_extraction(mut self, extraction: ExtractionConfig) -> Self {
        self.extraction = extraction;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_stale_task_timeout(mut self, timeout: Duration) -> Self {
        self.stale_task_timeout = timeout;
        self
    }

    pub fn with_publish_retries(mut self, attempts: u32, delay: Duration) -> Self {
        self.publish_attempts = attempts.max(1);
        self.publish_retry_delay = delay;
        self
    }

    /// How often a running task refreshes its `updated_at`.
    pub fn heartbeat_interval(&self) -> Duration {
        (self.stale_task_timeout / 4).max(Duration::from_millis(10))
    }
}

fn default_worker_id() -> String {
    format!("worker-{}", &uuid::Uuid::new_v4().simple().to_string()[..8])
}
