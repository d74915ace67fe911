//! End-to-end worker runs against a JSON store and stand-in encoder tools.

#![cfg(unix)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serial_test::serial;
use tempfile::TempDir;
use vprod_media::testing::FakeTools;
use vprod_media::ExtractionConfig;
use vprod_models::{
    IrDocument, ProduceVideoParams, Task, TaskId, TaskKind, TaskPriority, TaskResult,
    TaskStatus,
};
use vprod_store::{JsonTaskStore, StoreError, StoreResult, TaskFilter, TaskStore};
use vprod_worker::{
    fail_stale_tasks, TextCompletion, Worker, WorkerConfig, WorkerPool, WorkerResult,
    WorkerState,
};

struct Prose;

#[async_trait]
impl TextCompletion for Prose {
    async fn complete(&self, _prompt: &str) -> WorkerResult<String> {
        Ok("A dynamic opening shot followed by close-ups would work well.".to_string())
    }
}

/// Cancels the task it is planning for, then answers with prose.
struct CancelDuringPlanning {
    store: Arc<dyn TaskStore>,
    task_id: TaskId,
}

#[async_trait]
impl TextCompletion for CancelDuringPlanning {
    async fn complete(&self, _prompt: &str) -> WorkerResult<String> {
        self.store.cancel(&self.task_id).await?;
        Ok("no json".to_string())
    }
}

/// Answers with prose after a delay longer than the stale task timeout.
struct SlowProse(Duration);

#[async_trait]
impl TextCompletion for SlowProse {
    async fn complete(&self, _prompt: &str) -> WorkerResult<String> {
        tokio::time::sleep(self.0).await;
        Ok("Open wide, then cut to the product.".to_string())
    }
}

/// Delegates to a real store, but its first `failures` calls to `fail` hit
/// a full disk.
struct DiskFullOnFail {
    inner: Arc<dyn TaskStore>,
    failures: AtomicUsize,
}

impl DiskFullOnFail {
    fn new(inner: Arc<dyn TaskStore>, failures: usize) -> Self {
        Self {
            inner,
            failures: AtomicUsize::new(failures),
        }
    }
}

#[async_trait]
impl TaskStore for DiskFullOnFail {
    async fn insert(&self, task: Task) -> StoreResult<Task> {
        self.inner.insert(task).await
    }

    async fn get(&self, id: &TaskId) -> StoreResult<Option<Task>> {
        self.inner.get(id).await
    }

    async fn list(&self, filter: TaskFilter) -> StoreResult<Vec<Task>> {
        self.inner.list(filter).await
    }

    async fn update_status(
        &self,
        id: &TaskId,
        status: TaskStatus,
        progress: Option<u8>,
    ) -> StoreResult<bool> {
        self.inner.update_status(id, status, progress).await
    }

    async fn update_progress(&self, id: &TaskId, progress: u8) -> StoreResult<bool> {
        self.inner.update_progress(id, progress).await
    }

    async fn set_result(&self, id: &TaskId, result: TaskResult) -> StoreResult<bool> {
        self.inner.set_result(id, result).await
    }

    async fn claim(&self, id: &TaskId) -> StoreResult<Option<Task>> {
        self.inner.claim(id).await
    }

    async fn fail(&self, id: &TaskId, error: &str) -> StoreResult<bool> {
        let full = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if full {
            return Err(StoreError::io(
                "/tasks.json",
                std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
            ));
        }
        self.inner.fail(id, error).await
    }

    async fn fail_stale(
        &self,
        stale_before: DateTime<Utc>,
        error: &str,
    ) -> StoreResult<Vec<TaskId>> {
        self.inner.fail_stale(stale_before, error).await
    }

    async fn delete(&self, id: &TaskId) -> StoreResult<bool> {
        self.inner.delete(id).await
    }
}

struct Env {
    tools: FakeTools,
    dir: TempDir,
    store: Arc<dyn TaskStore>,
    source: PathBuf,
}

impl Env {
    async fn new() -> Self {
        let tools = FakeTools::install().unwrap();
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source.mp4");
        tools.write_source(&source).unwrap();
        let store: Arc<dyn TaskStore> =
            Arc::new(JsonTaskStore::open(dir.path().join("tasks.json")).await.unwrap());
        Self {
            tools,
            dir,
            store,
            source,
        }
    }

    fn output_dir(&self) -> PathBuf {
        self.dir.path().join("output")
    }

    fn config(&self, extraction: ExtractionConfig) -> WorkerConfig {
        WorkerConfig::default()
            .with_output_dir(self.output_dir())
            .with_extraction(extraction)
            .with_poll_interval(Duration::from_millis(20))
    }

    fn worker(&self, completion: Option<Arc<dyn TextCompletion>>) -> Worker {
        let config = self.config(self.tools.config());
        Worker::new("worker-test", &config, Arc::clone(&self.store), completion)
    }

    async fn submit(&self, params: ProduceVideoParams) -> Task {
        self.store
            .create(TaskKind::ProduceVideo(params), TaskPriority::Normal)
            .await
            .unwrap()
    }

    async fn get(&self, id: &TaskId) -> Task {
        self.store.get(id).await.unwrap().unwrap()
    }
}

#[tokio::test]
#[serial]
async fn test_prose_completion_falls_back_to_template_and_completes() {
    let env = Env::new().await;
    let task = env
        .submit(ProduceVideoParams::new("30s highlight reel").with_source_media(&env.source))
        .await;

    let worker = env.worker(Some(Arc::new(Prose)));
    assert!(worker.run_once().await.unwrap());
    assert_eq!(worker.state(), WorkerState::Idle);

    let done = env.get(&task.id).await;
    assert_eq!(done.status, TaskStatus::Completed);
    assert_eq!(done.progress, 100);
    assert!(done.error.is_none());

    let result = done.result.unwrap();
    assert!(result.success);
    assert_eq!(result.total_segments, 1);
    assert_eq!(result.output_dir, env.output_dir().join(task.id.as_str()));
    assert_eq!(
        result.segments[0].file_path,
        result.output_dir.join("01_seg_001.mp4")
    );
    assert!(result.segments[0].file_path.exists());
    assert!(result
        .project_name
        .starts_with(&format!("ir_video_{}_", result.project_id)));

    let ir = IrDocument::from_value(
        serde_json::from_slice(&std::fs::read(&result.ir_file).unwrap()).unwrap(),
    );
    assert!(ir.validate().valid);
    assert_eq!(ir.project_id(), Some(result.project_id.as_str()));
    let metadata = ir.metadata.unwrap();
    assert_eq!(metadata.user_input.as_deref(), Some("30s highlight reel"));
    assert_eq!(metadata.target_duration, Some(60.0));
}

#[tokio::test]
#[serial]
async fn test_missing_encoder_fails_task_keeping_progress() {
    let env = Env::new().await;
    let task = env
        .submit(ProduceVideoParams::new("reel").with_source_media(&env.source))
        .await;

    let config = env.config(env.tools.config_without_ffmpeg());
    let worker = Worker::new("worker-test", &config, Arc::clone(&env.store), None);
    assert!(worker.run_once().await.unwrap());

    let failed = env.get(&task.id).await;
    assert_eq!(failed.status, TaskStatus::Failed);
    let error = failed.error.unwrap();
    assert!(error.starts_with("precondition_failed: "), "{error}");
    assert!(error.contains("FFmpeg not found"), "{error}");
    // Last milestone before extraction.
    assert_eq!(failed.progress, 20);
    assert!(failed.updated_at > task.updated_at);
    assert!(failed.result.is_none());
}

#[tokio::test]
#[serial]
async fn test_missing_requirement_is_malformed_input() {
    let env = Env::new().await;
    let task = env
        .submit(ProduceVideoParams::new("  ").with_source_media(&env.source))
        .await;

    let worker = env.worker(None);
    assert!(worker.run_once().await.unwrap());

    let failed = env.get(&task.id).await;
    assert_eq!(failed.status, TaskStatus::Failed);
    assert!(failed
        .error
        .unwrap()
        .starts_with("malformed_input: "));
    assert_eq!(failed.progress, 0);
    assert!(!env.output_dir().join(task.id.as_str()).exists());
}

#[tokio::test]
#[serial]
async fn test_ir_preview_segments_drive_extraction() {
    let env = Env::new().await;
    let preview = IrDocument::from_value(serde_json::json!({
        "metadata": { "project_id": "preview-1" },
        "visual_structure": { "segments": [
            { "id": "hook", "start_time": 0.0, "duration": 3.0 },
            { "id": "Broken take", "start_time": 3.0, "duration": 2.0 },
            { "id": "empty", "start_time": 5.0, "duration": 0.0 },
            { "id": "payoff", "start_time": 6.0, "duration": 4.0 }
        ]}
    }));
    let task = env
        .submit(
            ProduceVideoParams::new("teaser")
                .with_source_media(&env.source)
                .with_ir_preview(preview),
        )
        .await;

    let worker = env.worker(Some(Arc::new(Prose)));
    worker.run_once().await.unwrap();

    let done = env.get(&task.id).await;
    assert_eq!(done.status, TaskStatus::Completed);
    let result = done.result.unwrap();
    assert_eq!(result.project_id, "preview-1");
    let ids: Vec<u32> = result.segments.iter().map(|s| s.segment_id).collect();
    assert_eq!(ids, vec![1, 4]);
    assert_eq!(result.segments[1].title, "payoff");
    assert_eq!(result.segments[1].duration, 4.0);
}

#[tokio::test]
#[serial]
async fn test_cancel_while_running_keeps_task_canceled() {
    let env = Env::new().await;
    let task = env
        .submit(ProduceVideoParams::new("reel").with_source_media(&env.source))
        .await;

    let completion = CancelDuringPlanning {
        store: Arc::clone(&env.store),
        task_id: task.id.clone(),
    };
    let worker = env.worker(Some(Arc::new(completion)));
    assert!(worker.run_once().await.unwrap());

    let canceled = env.get(&task.id).await;
    assert_eq!(canceled.status, TaskStatus::Canceled);
    assert!(canceled.result.is_none());
    assert!(canceled.error.is_none());
}

#[tokio::test]
#[serial]
async fn test_idle_worker_reports_nothing_to_do() {
    let env = Env::new().await;
    let worker = env.worker(None);

    assert!(!worker.run_once().await.unwrap());
    assert_eq!(worker.state(), WorkerState::Idle);
}

#[tokio::test]
#[serial]
async fn test_pool_drains_queue_and_stops() {
    let env = Env::new().await;
    let mut ids = Vec::new();
    for requirement in ["first", "second", "third"] {
        let task = env
            .submit(ProduceVideoParams::new(requirement).with_source_media(&env.source))
            .await;
        ids.push(task.id);
    }

    let mut config = env.config(env.tools.config());
    config.worker_id = "pool".to_string();
    config.worker_count = 2;
    let pool = WorkerPool::spawn(&config, Arc::clone(&env.store), None);

    let all_done = async {
        loop {
            let completed = env
                .store
                .list_by_status(TaskStatus::Completed)
                .await
                .unwrap();
            if completed.len() == ids.len() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(20), all_done)
        .await
        .expect("tasks did not complete");

    pool.shutdown().await;
    let states = pool.states();
    assert_eq!(states.len(), 2);
    assert_eq!(states[0].0, "pool-1");
    assert!(states.iter().all(|(_, s)| *s == WorkerState::Stopped));
}

#[tokio::test]
#[serial]
async fn test_outcome_write_is_retried_while_store_is_unavailable() {
    let env = Env::new().await;
    let task = env.submit(ProduceVideoParams::new("reel")).await;

    let store: Arc<dyn TaskStore> = Arc::new(DiskFullOnFail::new(Arc::clone(&env.store), 2));
    let config = env
        .config(env.tools.config())
        .with_publish_retries(3, Duration::from_millis(5));
    let worker = Worker::new("worker-test", &config, store, None);
    assert!(worker.run_once().await.unwrap());
    assert!(worker.current_task().is_none());

    let failed = env.get(&task.id).await;
    assert_eq!(failed.status, TaskStatus::Failed);
    let error = failed.error.unwrap();
    assert!(error.starts_with("malformed_input: "), "{error}");
}

#[tokio::test]
#[serial]
async fn test_unpublished_task_is_failed_once_stale() {
    let env = Env::new().await;
    let task = env.submit(ProduceVideoParams::new("reel")).await;

    let store: Arc<dyn TaskStore> = Arc::new(DiskFullOnFail::new(Arc::clone(&env.store), 10));
    let config = env
        .config(env.tools.config())
        .with_publish_retries(2, Duration::from_millis(5));
    let worker = Worker::new("worker-test", &config, store, None);

    let err = worker.run_once().await.unwrap_err();
    assert!(err.to_string().contains("disk full"), "{err}");
    assert_eq!(env.get(&task.id).await.status, TaskStatus::Processing);
    assert!(!worker.run_once().await.unwrap());

    assert!(fail_stale_tasks(env.store.as_ref(), Duration::from_secs(60))
        .await
        .unwrap()
        .is_empty());
    tokio::time::sleep(Duration::from_millis(100)).await;
    let failed = fail_stale_tasks(env.store.as_ref(), Duration::from_millis(50))
        .await
        .unwrap();
    assert_eq!(failed, vec![task.id.clone()]);

    let interrupted = env.get(&task.id).await;
    assert_eq!(interrupted.status, TaskStatus::Failed);
    assert!(interrupted.error.unwrap().starts_with("interrupted: "));
}

#[tokio::test]
#[serial]
async fn test_pool_fails_tasks_abandoned_by_a_crashed_worker() {
    let env = Env::new().await;
    let orphan = env.submit(ProduceVideoParams::new("reel")).await;
    env.store.claim(&orphan.id).await.unwrap().unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let config = env
        .config(env.tools.config())
        .with_stale_task_timeout(Duration::from_millis(50));
    let pool = WorkerPool::spawn(&config, Arc::clone(&env.store), None);

    let reaped = async {
        while env.get(&orphan.id).await.status != TaskStatus::Failed {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(5), reaped)
        .await
        .expect("orphaned task was not failed");
    pool.shutdown().await;

    let failed = env.get(&orphan.id).await;
    assert!(failed.error.unwrap().starts_with("interrupted: "));
}

#[tokio::test]
#[serial]
async fn test_heartbeat_keeps_long_task_from_going_stale() {
    let env = Env::new().await;
    let task = env
        .submit(ProduceVideoParams::new("reel").with_source_media(&env.source))
        .await;

    let config = env
        .config(env.tools.config())
        .with_stale_task_timeout(Duration::from_millis(200));
    let completion: Arc<dyn TextCompletion> = Arc::new(SlowProse(Duration::from_millis(600)));
    let pool = WorkerPool::spawn(&config, Arc::clone(&env.store), Some(completion));

    let finished = async {
        while !env.get(&task.id).await.is_terminal() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(20), finished)
        .await
        .expect("task did not finish");
    pool.shutdown().await;

    let done = env.get(&task.id).await;
    assert_eq!(done.status, TaskStatus::Completed, "{:?}", done.error);
}

#[tokio::test]
#[serial]
async fn test_shutdown_timeout_fails_in_flight_task() {
    let env = Env::new().await;
    let task = env
        .submit(ProduceVideoParams::new("reel").with_source_media(&env.source))
        .await;

    let mut config = env.config(env.tools.config());
    config.shutdown_timeout = Duration::from_millis(50);
    let completion: Arc<dyn TextCompletion> = Arc::new(SlowProse(Duration::from_secs(30)));
    let pool = WorkerPool::spawn(&config, Arc::clone(&env.store), Some(completion));

    let claimed = async {
        while env.get(&task.id).await.status != TaskStatus::Processing {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(5), claimed)
        .await
        .expect("task was not claimed");
    pool.shutdown().await;

    let failed = env.get(&task.id).await;
    assert_eq!(failed.status, TaskStatus::Failed);
    assert!(failed.error.unwrap().starts_with("interrupted: "));
}
