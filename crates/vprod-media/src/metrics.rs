//! Extraction metrics.

use metrics::{counter, histogram};

/// Metric names as constants for consistency.
pub mod names {
    pub const FFMPEG_DURATION_SECONDS: &str = "vprod_ffmpeg_duration_seconds";
    pub const SEGMENTS_PUBLISHED_TOTAL: &str = "vprod_segments_published_total";
    pub const SEGMENTS_SKIPPED_TOTAL: &str = "vprod_segments_skipped_total";
}

/// Record one encoder invocation.
pub fn record_ffmpeg_duration(duration_secs: f64) {
    histogram!(names::FFMPEG_DURATION_SECONDS).record(duration_secs);
}

/// Record a segment that passed the probe and was published.
pub fn record_segment_published() {
    counter!(names::SEGMENTS_PUBLISHED_TOTAL).increment(1);
}

/// Record a skipped segment.
pub fn record_segment_skipped(reason: &'static str) {
    counter!(names::SEGMENTS_SKIPPED_TOTAL, "reason" => reason).increment(1);
}
