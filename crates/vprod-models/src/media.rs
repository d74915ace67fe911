//! Segment extraction requests and outputs.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One requested time range of the source media.
///
/// Upstream producers spell the range either `start`/`end` or
/// `start_time`/`end_time`; both are accepted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl SegmentRequest {
    /// Create a request with `start`/`end` keys.
    pub fn new(start: f64, end: f64, title: impl Into<String>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
            title: Some(title.into()),
            ..Default::default()
        }
    }

    /// Resolve the time range: the first complete pair wins.
    pub fn time_range(&self) -> Option<(f64, f64)> {
        match (self.start, self.end) {
            (Some(start), Some(end)) => Some((start, end)),
            _ => match (self.start_time, self.end_time) {
                (Some(start), Some(end)) => Some((start, end)),
                _ => None,
            },
        }
    }
}

/// A published output segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaSegment {
    /// 1-based position in the request list
    pub segment_id: u32,
    pub title: String,
    pub start_time: f64,
    pub end_time: f64,
    /// `end_time - start_time`, always > 0
    pub duration: f64,
    pub file_path: PathBuf,
}

/// Video file information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    /// Duration in seconds
    pub duration: f64,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Frame rate (fps)
    pub fps: f64,
    /// Video codec
    pub codec: String,
    /// File size in bytes
    pub size: u64,
    /// Bitrate in bits/second
    pub bitrate: u64,
}
