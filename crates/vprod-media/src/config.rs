//! Extraction configuration.

use std::path::PathBuf;

/// Encoder binaries and re-encode parameters for segment extraction.
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    /// FFmpeg binary name or path
    pub ffmpeg_bin: PathBuf,
    /// FFprobe binary name or path
    pub ffprobe_bin: PathBuf,
    /// Hard limit per encoder invocation
    pub ffmpeg_timeout_secs: u64,
    /// Output container extension
    pub container: String,
    pub video_codec: String,
    pub preset: String,
    pub crf: u8,
    pub audio_codec: String,
    pub audio_bitrate: String,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            ffmpeg_bin: PathBuf::from("ffmpeg"),
            ffprobe_bin: PathBuf::from("ffprobe"),
            ffmpeg_timeout_secs: 600,
            container: "mp4".to_string(),
            video_codec: "libx264".to_string(),
            preset: "medium".to_string(),
            crf: 23,
            audio_codec: "aac".to_string(),
            audio_bitrate: "128k".to_string(),
        }
    }
}

impl ExtractionConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            ffmpeg_bin: std::env::var("FFMPEG_BIN")
                .map(PathBuf::from)
                .unwrap_or(defaults.ffmpeg_bin),
            ffprobe_bin: std::env::var("FFPROBE_BIN")
                .map(PathBuf::from)
                .unwrap_or(defaults.ffprobe_bin),
            ffmpeg_timeout_secs: std::env::var("FFMPEG_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.ffmpeg_timeout_secs),
            container: std::env::var("SEGMENT_CONTAINER")
                .ok()
                .map(|s| s.trim_start_matches('.').to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.container),
            ..defaults
        }
    }

    /// Point both tools at explicit paths.
    pub fn with_tools(mut self, ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        self.ffmpeg_bin = ffmpeg.into();
        self.ffprobe_bin = ffprobe.into();
        self
    }
}
