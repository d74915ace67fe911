//! Segment extraction engine.
//!
//! Each requested range is re-encoded into its own staging directory inside
//! the output directory, probed, and only then renamed to its final name. A
//! segment that fails anywhere along the way is skipped; the batch fails only
//! when nothing was published.

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};
use vprod_models::{MediaSegment, SegmentRequest, VideoInfo};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::config::ExtractionConfig;
use crate::error::{MediaError, MediaResult};
use crate::fs_utils::{move_file, remove_if_exists};
use crate::metrics;
use crate::probe;
use crate::progress::ProgressCallback;

/// Audio/video sync correction and progressive-playback layout.
const SYNC_AND_LAYOUT_ARGS: [&str; 8] = [
    "-avoid_negative_ts",
    "1",
    "-af",
    "aresample=async=1",
    "-fps_mode",
    "cfr",
    "-movflags",
    "+faststart",
];

/// Outcome of [`SegmentExtractor::extract`].
#[derive(Debug, Clone)]
pub struct ExtractionResult {
    /// Published segments, in request order
    pub segments: Vec<MediaSegment>,
    /// Number of published segments
    pub total_segments: usize,
    pub output_dir: PathBuf,
    /// Source probe; `None` when the probe failed
    pub source_info: Option<VideoInfo>,
}

/// Cuts named time ranges out of a source file.
#[derive(Clone)]
pub struct SegmentExtractor {
    config: ExtractionConfig,
    runner: FfmpegRunner,
    progress: Option<ProgressCallback>,
}

impl SegmentExtractor {
    pub fn new(config: ExtractionConfig) -> Self {
        let mut runner = FfmpegRunner::new().with_binary(config.ffmpeg_bin.clone());
        if config.ffmpeg_timeout_secs > 0 {
            runner = runner.with_timeout(config.ffmpeg_timeout_secs);
        }
        Self {
            config,
            runner,
            progress: None,
        }
    }

    /// Report batch progress (0.0-1.0) while extracting.
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Extract every valid range of `requests` from `source` into `output_dir`.
    ///
    /// # Errors
    ///
    /// - A missing encoder, prober or source file fails immediately, before
    ///   anything is written.
    /// - [`MediaError::EmptyResult`] when no segment could be published.
    pub async fn extract(
        &self,
        source: &Path,
        requests: &[SegmentRequest],
        output_dir: &Path,
    ) -> MediaResult<ExtractionResult> {
        self.runner.check()?;
        probe::check_ffprobe(&self.config.ffprobe_bin)?;
        match fs::metadata(source).await {
            Ok(meta) if meta.is_file() => {}
            _ => return Err(MediaError::FileNotFound(source.to_path_buf())),
        }
        fs::create_dir_all(output_dir).await?;

        let source_info = match probe::probe_video(&self.config.ffprobe_bin, source).await {
            Ok(info) => Some(info),
            Err(e) => {
                warn!("Could not probe source {}: {}", source.display(), e);
                None
            }
        };

        info!(
            source = %source.display(),
            requested = requests.len(),
            "Extracting segments into {}",
            output_dir.display()
        );

        let total = requests.len();
        let mut segments = Vec::new();

        for (index, request) in requests.iter().enumerate() {
            let ordinal = index + 1;
            let title = request
                .title
                .clone()
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| format!("Segment {}", ordinal));

            let Some((start, end)) = request
                .time_range()
                .filter(|(s, e)| s.is_finite() && e.is_finite() && *s >= 0.0)
            else {
                warn!(segment = ordinal, title = %title, "Skipping segment without a valid time range");
                metrics::record_segment_skipped("invalid_range");
                self.report(ordinal, total);
                continue;
            };

            let duration = end - start;
            if duration <= 0.0 {
                warn!(
                    segment = ordinal,
                    title = %title,
                    "Skipping segment with non-positive duration ({:.3}s -> {:.3}s)",
                    start,
                    end
                );
                metrics::record_segment_skipped("non_positive_duration");
                self.report(ordinal, total);
                continue;
            }

            let file_name = segment_file_name(ordinal, &title, &self.config.container);
            let final_path = output_dir.join(&file_name);

            match self
                .extract_one(source, start, duration, output_dir, &file_name, index, total)
                .await
            {
                Ok(()) => {
                    info!(segment = ordinal, "Published {}", final_path.display());
                    metrics::record_segment_published();
                    segments.push(MediaSegment {
                        segment_id: ordinal as u32,
                        title,
                        start_time: start,
                        end_time: end,
                        duration,
                        file_path: final_path,
                    });
                }
                Err(e) if e.is_precondition() => return Err(e),
                Err(e) => {
                    match &e {
                        MediaError::FfmpegFailed {
                            stderr: Some(stderr),
                            ..
                        } => warn!(segment = ordinal, stderr = %stderr, "Segment skipped: {}", e),
                        _ => warn!(segment = ordinal, "Segment skipped: {}", e),
                    }
                    metrics::record_segment_skipped(e.reason());
                    // Nothing may remain under the final name of a failed segment.
                    remove_if_exists(&final_path).await?;
                }
            }
            self.report(ordinal, total);
        }

        if segments.is_empty() {
            return Err(MediaError::EmptyResult { requested: total });
        }

        Ok(ExtractionResult {
            total_segments: segments.len(),
            segments,
            output_dir: output_dir.to_path_buf(),
            source_info,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn extract_one(
        &self,
        source: &Path,
        start: f64,
        duration: f64,
        output_dir: &Path,
        file_name: &str,
        index: usize,
        total: usize,
    ) -> MediaResult<()> {
        // Removed on drop, on every path out of this function.
        let staging = tempfile::Builder::new()
            .prefix(".segment-")
            .tempdir_in(output_dir)?;
        let staged = staging.path().join(file_name);

        let cmd = FfmpegCommand::new(source, &staged)
            .seek(start)
            .duration(duration)
            .video_codec(&self.config.video_codec)
            .preset(&self.config.preset)
            .crf(self.config.crf)
            .audio_codec(&self.config.audio_codec)
            .audio_bitrate(&self.config.audio_bitrate)
            .output_args(SYNC_AND_LAYOUT_ARGS);

        let progress = self.progress.clone();
        let total_ms = (duration * 1000.0) as i64;
        self.runner
            .run_with_progress(&cmd, move |p| {
                if let Some(report) = &progress {
                    report((index as f64 + p.fraction(total_ms)) / total as f64);
                }
            })
            .await?;

        probe::verify_video_stream(&self.config.ffprobe_bin, &staged).await?;

        move_file(&staged, output_dir.join(file_name)).await?;
        debug!("Removing staging directory {}", staging.path().display());
        Ok(())
    }

    fn report(&self, done: usize, total: usize) {
        if let Some(report) = &self.progress {
            report(done as f64 / total.max(1) as f64);
        }
    }
}

/// Filesystem-safe form of a segment title.
///
/// Alphanumerics, spaces, underscores and hyphens are kept; everything else
/// becomes `_`. The result is trimmed and inner spaces become `_`.
pub fn sanitize_title(title: &str) -> String {
    let replaced: String = title
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, ' ' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    replaced.trim().replace(' ', "_")
}

/// `<ordinal, 2 digits>_<safe title>.<container>`
pub fn segment_file_name(ordinal: usize, title: &str, container: &str) -> String {
    format!("{:02}_{}.{}", ordinal, sanitize_title(title), container)
}
