//! Write-through task store backed by one JSON file.
//!
//! The file holds a JSON array of task records and is the only copy of the
//! task set: several processes may open the same path. Every mutation takes
//! an exclusive OS lock on a sibling `.lock` file, re-reads the array, applies
//! the change, writes the result to a sibling temp file and renames it over
//! the store file. Readers skip the lock; the rename makes every write appear
//! whole.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fd_lock::RwLock as FileLock;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};
use vprod_models::{Task, TaskId, TaskResult, TaskStatus};

use crate::error::{StoreError, StoreResult};
use crate::store::{TaskFilter, TaskStore};

pub struct JsonTaskStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl JsonTaskStore {
    /// Open the store at `path`, creating an empty one if the file is absent.
    ///
    /// An unreadable or unparsable file is an error, never an empty store.
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::io(parent, e))?;
        }

        let store = Self {
            lock_path: sibling(&path, ".lock"),
            path,
        };

        let (path, lock_path) = (store.path.clone(), store.lock_path.clone());
        let count = tokio::task::spawn_blocking(move || {
            with_lock(&lock_path, || match std::fs::read(&path) {
                Ok(bytes) => parse_tasks(&path, &bytes).map(|tasks| tasks.len()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    write_atomic(&path, &[])?;
                    Ok(0)
                }
                Err(e) => Err(StoreError::io(&path, e)),
            })
        })
        .await??;

        info!("Opened task store {} ({} tasks)", store.path.display(), count);
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current contents of the store file.
    async fn load(&self) -> StoreResult<Vec<Task>> {
        let bytes = fs::read(&self.path)
            .await
            .map_err(|e| StoreError::io(&self.path, e))?;
        parse_tasks(&self.path, &bytes)
    }

    /// Apply `f` to the task set under the file lock and write it back if
    /// `f` reports a change.
    async fn mutate<R, F>(&self, f: F) -> StoreResult<R>
    where
        F: FnOnce(&mut Vec<Task>) -> StoreResult<(R, bool)> + Send + 'static,
        R: Send + 'static,
    {
        let (path, lock_path) = (self.path.clone(), self.lock_path.clone());
        tokio::task::spawn_blocking(move || {
            with_lock(&lock_path, || {
                let bytes = std::fs::read(&path).map_err(|e| StoreError::io(&path, e))?;
                let mut tasks = parse_tasks(&path, &bytes)?;
                let (out, changed) = f(&mut tasks)?;
                if changed {
                    write_atomic(&path, &tasks)?;
                }
                Ok(out)
            })
        })
        .await?
    }

    /// Mutate the task with `id`, if any. `f` reports whether it changed it.
    async fn mutate_task<R, F>(&self, id: &TaskId, f: F) -> StoreResult<Option<R>>
    where
        F: FnOnce(&mut Task) -> StoreResult<(R, bool)> + Send + 'static,
        R: Send + 'static,
    {
        let id = id.clone();
        self.mutate(move |tasks| match tasks.iter_mut().find(|t| t.id == id) {
            Some(task) => f(task).map(|(out, changed)| (Some(out), changed)),
            None => Ok((None, false)),
        })
        .await
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(suffix);
    path.with_file_name(name)
}

/// Run `f` while holding the exclusive lock on `lock_path`. Blocks.
fn with_lock<R>(lock_path: &Path, f: impl FnOnce() -> StoreResult<R>) -> StoreResult<R> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(lock_path)
        .map_err(|e| StoreError::io(lock_path, e))?;
    let mut lock = FileLock::new(file);
    let _guard = lock.write().map_err(|e| StoreError::io(lock_path, e))?;
    f()
}

fn parse_tasks(path: &Path, bytes: &[u8]) -> StoreResult<Vec<Task>> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    serde_json::from_slice(bytes).map_err(|source| StoreError::Corrupt {
        path: path.to_path_buf(),
        source,
    })
}

fn write_atomic(path: &Path, tasks: &[Task]) -> StoreResult<()> {
    let bytes = serde_json::to_vec_pretty(tasks)?;
    let tmp = sibling(path, ".tmp");

    let write = || -> std::io::Result<()> {
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        std::fs::rename(&tmp, path)
    };

    if let Err(e) = write() {
        let _ = std::fs::remove_file(&tmp);
        return Err(StoreError::io(path, e));
    }

    debug!("Persisted {} tasks to {}", tasks.len(), path.display());
    Ok(())
}

#[async_trait]
impl TaskStore for JsonTaskStore {
    async fn insert(&self, task: Task) -> StoreResult<Task> {
        let created = self
            .mutate(move |tasks| {
                if tasks.iter().any(|t| t.id == task.id) {
                    return Err(StoreError::AlreadyExists(task.id.clone()));
                }
                tasks.push(task.clone());
                Ok((task, true))
            })
            .await?;

        info!(
            task_id = %created.id,
            task_type = %created.task_type(),
            priority = %created.priority,
            "Task created"
        );
        Ok(created)
    }

    async fn get(&self, id: &TaskId) -> StoreResult<Option<Task>> {
        Ok(self.load().await?.into_iter().find(|t| &t.id == id))
    }

    async fn list(&self, filter: TaskFilter) -> StoreResult<Vec<Task>> {
        // Reverse insertion order first so the stable sort puts the later
        // insertion ahead on equal timestamps.
        let mut tasks: Vec<Task> = self
            .load()
            .await?
            .into_iter()
            .rev()
            .filter(|t| filter.matches(t))
            .collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tasks)
    }

    async fn update_status(
        &self,
        id: &TaskId,
        status: TaskStatus,
        progress: Option<u8>,
    ) -> StoreResult<bool> {
        let updated = self
            .mutate_task(id, move |task| {
                task.set_status(status, progress)?;
                Ok(((), true))
            })
            .await?;
        Ok(updated.is_some())
    }

    async fn update_progress(&self, id: &TaskId, progress: u8) -> StoreResult<bool> {
        let updated = self
            .mutate_task(id, move |task| {
                let changed = task.set_progress(progress);
                Ok((changed, changed))
            })
            .await?;
        Ok(updated.unwrap_or(false))
    }

    async fn set_result(&self, id: &TaskId, result: TaskResult) -> StoreResult<bool> {
        let updated = self
            .mutate_task(id, move |task| {
                task.complete(result)?;
                Ok(((), true))
            })
            .await?;
        Ok(updated.is_some())
    }

    async fn claim(&self, id: &TaskId) -> StoreResult<Option<Task>> {
        let claimed = self
            .mutate_task(id, |task| match task.claim() {
                Ok(()) => Ok((Some(task.clone()), true)),
                Err(_) => Ok((None, false)),
            })
            .await?;
        Ok(claimed.flatten())
    }

    async fn fail(&self, id: &TaskId, error: &str) -> StoreResult<bool> {
        let error = error.to_string();
        let updated = self
            .mutate_task(id, move |task| {
                task.fail(error)?;
                Ok(((), true))
            })
            .await?;
        Ok(updated.is_some())
    }

    async fn fail_stale(
        &self,
        stale_before: DateTime<Utc>,
        error: &str,
    ) -> StoreResult<Vec<TaskId>> {
        let error = error.to_string();
        let failed = self
            .mutate(move |tasks| {
                let mut failed = Vec::new();
                for task in tasks.iter_mut().filter(|t| {
                    t.status == TaskStatus::Processing && t.updated_at < stale_before
                }) {
                    task.fail(error.clone())?;
                    failed.push(task.id.clone());
                }
                let changed = !failed.is_empty();
                Ok((failed, changed))
            })
            .await?;

        for id in &failed {
            warn!(task_id = %id, "Failed stale processing task");
        }
        Ok(failed)
    }

    async fn delete(&self, id: &TaskId) -> StoreResult<bool> {
        let target = id.clone();
        let deleted = self
            .mutate(move |tasks| {
                let before = tasks.len();
                tasks.retain(|t| t.id != target);
                let removed = tasks.len() != before;
                Ok((removed, removed))
            })
            .await?;
        if deleted {
            info!(task_id = %id, "Task deleted");
        }
        Ok(deleted)
    }
}
