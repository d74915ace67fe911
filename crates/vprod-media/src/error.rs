//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur during media processing.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found: {0}")]
    FfmpegNotFound(String),

    #[error("FFprobe not found: {0}")]
    FfprobeNotFound(String),

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("Output has no decodable video stream: {0}")]
    ProbeFailed(PathBuf),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("No segment was produced ({requested} requested)")]
    EmptyResult { requested: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid video file: {0}")]
    InvalidVideo(String),
}

impl MediaError {
    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Create an FFprobe failure error.
    pub fn ffprobe_failed(message: impl Into<String>, stderr: Option<String>) -> Self {
        Self::FfprobeFailed {
            message: message.into(),
            stderr,
        }
    }

    /// Missing tool or missing input: fatal for the whole call, never retried.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::FfmpegNotFound(_) | Self::FfprobeNotFound(_) | Self::FileNotFound(_)
        )
    }

    /// Short label used for skip metrics and logs.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::FfmpegNotFound(_) | Self::FfprobeNotFound(_) => "tool_missing",
            Self::FfmpegFailed { .. } => "encoder_failed",
            Self::FfprobeFailed { .. } | Self::ProbeFailed(_) | Self::InvalidVideo(_) => {
                "probe_failed"
            }
            Self::FileNotFound(_) => "file_not_found",
            Self::Timeout(_) => "timeout",
            Self::EmptyResult { .. } => "empty_result",
            Self::Io(_) => "io",
            Self::JsonParse(_) => "json",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precondition_classification() {
        assert!(MediaError::FfmpegNotFound("ffmpeg".into()).is_precondition());
        assert!(MediaError::FileNotFound(PathBuf::from("/nope.mp4")).is_precondition());
        assert!(!MediaError::ffmpeg_failed("exit 1", None, Some(1)).is_precondition());
        assert!(!MediaError::EmptyResult { requested: 2 }.is_precondition());
    }
}
