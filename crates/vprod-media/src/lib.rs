//! FFmpeg CLI wrapper and segment extraction.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building
//! - Progress parsing from `-progress pipe:2`
//! - Timeout enforcement for encoder processes
//! - The segment extraction engine with its probe-before-publish gate

pub mod command;
pub mod config;
pub mod error;
pub mod extract;
pub mod fs_utils;
pub mod metrics;
pub mod probe;
pub mod progress;
#[cfg(all(unix, any(test, feature = "testing")))]
pub mod testing;

pub use command::{FfmpegCommand, FfmpegRunner};
pub use config::ExtractionConfig;
pub use error::{MediaError, MediaResult};
pub use extract::{sanitize_title, segment_file_name, ExtractionResult, SegmentExtractor};
pub use probe::{probe_video, verify_video_stream};
pub use progress::{FfmpegProgress, ProgressCallback};
