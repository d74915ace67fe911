//! The production pipeline for one claimed task.
//!
//! 1. Validate parameters.
//! 2. Plan the IR and write it to `<output_dir>/<task_id>/ir.json`.
//! 3. Extract the IR's segments from the source media into the same directory.
//! 4. Assemble the task result.
//!
//! Progress milestones are written to the store along the way; extraction
//! progress is mapped onto the range between the planning and result
//! milestones.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, warn};
use vprod_media::{ExtractionConfig, SegmentExtractor};
use vprod_models::{ProduceVideoParams, Task, TaskId, TaskKind, TaskResult};
use vprod_store::TaskStore;

use crate::completion::TextCompletion;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::TaskLogger;
use crate::planner::{IrOrigin, IrPlanner};

const PROGRESS_STARTED: u8 = 10;
const PROGRESS_PLANNED: u8 = 20;
const PROGRESS_EXTRACTED: u8 = 90;

pub const IR_FILE_NAME: &str = "ir.json";

/// Runs claimed tasks to a [`TaskResult`].
#[derive(Clone)]
pub struct Pipeline {
    store: Arc<dyn TaskStore>,
    planner: IrPlanner,
    extraction: ExtractionConfig,
    output_dir: PathBuf,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn TaskStore>,
        completion: Option<Arc<dyn TextCompletion>>,
        extraction: ExtractionConfig,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            planner: IrPlanner::new(completion),
            extraction,
            output_dir: output_dir.into(),
        }
    }

    /// Directory holding every artifact of `task_id`.
    pub fn task_dir(&self, task_id: &TaskId) -> PathBuf {
        self.output_dir.join(task_id.as_str())
    }

    /// Execute a claimed task.
    pub async fn execute(&self, task: &Task, logger: &TaskLogger) -> WorkerResult<TaskResult> {
        match &task.kind {
            TaskKind::ProduceVideo(params) => self.produce_video(task, params, logger).await,
        }
    }

    async fn produce_video(
        &self,
        task: &Task,
        params: &ProduceVideoParams,
        logger: &TaskLogger,
    ) -> WorkerResult<TaskResult> {
        if params.user_requirement.trim().is_empty() {
            return Err(WorkerError::malformed_input(
                "missing user_requirement in task params",
            ));
        }
        let source = params.source_media.as_deref().ok_or_else(|| {
            WorkerError::malformed_input("missing source_media in task params")
        })?;

        self.progress(&task.id, PROGRESS_STARTED).await?;

        let planned = self.planner.plan(params, logger).await;
        if let IrOrigin::Template(reason) = planned.origin {
            logger.log_progress(&format!("Using template IR ({})", reason.as_str()));
        }
        let ir = planned.document;
        let project_id = ir
            .project_id()
            .map(str::to_string)
            .unwrap_or_else(|| task.id.to_string());

        let task_dir = self.task_dir(&task.id);
        tokio::fs::create_dir_all(&task_dir).await?;
        let ir_file = task_dir.join(IR_FILE_NAME);
        tokio::fs::write(&ir_file, serde_json::to_vec_pretty(&ir)?).await?;
        logger.log_progress(&format!("IR written to {}", ir_file.display()));

        self.progress(&task.id, PROGRESS_PLANNED).await?;

        let requests = ir.segment_requests();
        logger.log_progress(&format!(
            "Extracting {} segment(s) from {}",
            requests.len(),
            source.display()
        ));
        let extraction = self.extract(&task.id, source, &requests, &task_dir).await?;

        self.progress(&task.id, PROGRESS_EXTRACTED).await?;

        Ok(TaskResult {
            success: true,
            project_name: project_name(&project_id),
            project_id,
            output_dir: extraction.output_dir,
            total_segments: extraction.total_segments,
            segments: extraction.segments,
            ir_file,
            source_info: extraction.source_info,
        })
    }

    /// Run the extractor, forwarding its progress to the store.
    async fn extract(
        &self,
        task_id: &TaskId,
        source: &Path,
        requests: &[vprod_models::SegmentRequest],
        task_dir: &Path,
    ) -> WorkerResult<vprod_media::ExtractionResult> {
        let (progress_tx, mut progress_rx) = watch::channel(PROGRESS_PLANNED);

        let forwarder = {
            let store = Arc::clone(&self.store);
            let task_id = task_id.clone();
            tokio::spawn(async move {
                while progress_rx.changed().await.is_ok() {
                    let progress = *progress_rx.borrow_and_update();
                    if let Err(e) = store.update_progress(&task_id, progress).await {
                        warn!(task_id = %task_id, "Failed to record progress: {}", e);
                    }
                }
            })
        };

        let extractor = SegmentExtractor::new(self.extraction.clone()).with_progress(Arc::new(
            move |fraction: f64| {
                let span = f64::from(PROGRESS_EXTRACTED - PROGRESS_PLANNED);
                let progress = PROGRESS_PLANNED + (span * fraction.clamp(0.0, 1.0)) as u8;
                progress_tx.send_if_modified(|current| {
                    if progress > *current {
                        *current = progress;
                        true
                    } else {
                        false
                    }
                });
            },
        ));

        let result = extractor.extract(source, requests, task_dir).await;
        // Dropping the extractor closes the channel and ends the forwarder.
        drop(extractor);
        if let Err(e) = forwarder.await {
            warn!(task_id = %task_id, "Progress forwarder failed: {}", e);
        }

        Ok(result?)
    }

    async fn progress(&self, task_id: &TaskId, progress: u8) -> WorkerResult<()> {
        if !self.store.update_progress(task_id, progress).await? {
            debug!(task_id = %task_id, progress, "Progress ignored, task no longer processing");
        }
        Ok(())
    }
}

/// `ir_video_<project_id>_<YYYYmmdd_HHMMSS>`
pub fn project_name(project_id: &str) -> String {
    format!(
        "ir_video_{}_{}",
        project_id,
        Utc::now().format("%Y%m%d_%H%M%S")
    )
}
