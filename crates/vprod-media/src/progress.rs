//! FFmpeg progress parsing (`-progress pipe:2`).

use std::sync::Arc;

/// Progress information from FFmpeg.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FfmpegProgress {
    /// Current frame number
    pub frame: u64,
    /// Output time in milliseconds
    pub out_time_ms: i64,
    /// Encoding speed (e.g., 1.5 = 1.5x realtime)
    pub speed: f64,
    /// Whether encoding is complete
    pub is_complete: bool,
}

impl FfmpegProgress {
    /// Fraction (0.0-1.0) of an encode of `total_ms` milliseconds.
    pub fn fraction(&self, total_ms: i64) -> f64 {
        if self.is_complete {
            return 1.0;
        }
        if total_ms <= 0 {
            return 0.0;
        }
        (self.out_time_ms as f64 / total_ms as f64).clamp(0.0, 1.0)
    }

    /// Fold one `key=value` line into `self`.
    ///
    /// Returns `Some(snapshot)` at the end of each progress block, `None` for
    /// other keys, and `Err(())` for lines that are not progress output.
    pub(crate) fn apply_line(&mut self, line: &str) -> Result<Option<FfmpegProgress>, ()> {
        let Some((key, value)) = line.trim().split_once('=') else {
            return Err(());
        };

        match key.trim() {
            "out_time_ms" | "out_time_us" => {
                // Both keys carry microseconds despite the name.
                if let Ok(us) = value.trim().parse::<i64>() {
                    self.out_time_ms = us / 1000;
                }
            }
            "frame" => {
                if let Ok(frame) = value.trim().parse() {
                    self.frame = frame;
                }
            }
            "speed" => {
                if let Some(Ok(speed)) = value.trim().strip_suffix('x').map(str::parse) {
                    self.speed = speed;
                }
            }
            "progress" => {
                if value.trim() == "end" {
                    self.is_complete = true;
                }
                return Ok(Some(self.clone()));
            }
            "fps" | "bitrate" | "total_size" | "out_time" | "dup_frames" | "drop_frames" => {}
            k if k.starts_with("stream_") => {}
            _ => return Err(()),
        }

        Ok(None)
    }
}

/// Batch-level progress sink: receives the completed fraction (0.0-1.0).
pub type ProgressCallback = Arc<dyn Fn(f64) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_block() {
        let mut progress = FfmpegProgress::default();

        assert_eq!(progress.apply_line("out_time_ms=2500000"), Ok(None));
        assert_eq!(progress.out_time_ms, 2500);

        assert_eq!(progress.apply_line("speed=1.5x"), Ok(None));
        assert!((progress.speed - 1.5).abs() < 0.01);

        let snapshot = progress.apply_line("progress=continue").unwrap().unwrap();
        assert!((snapshot.fraction(5000) - 0.5).abs() < 0.01);

        progress.apply_line("progress=end").unwrap();
        assert!(progress.is_complete);
        assert_eq!(progress.fraction(5000), 1.0);
    }

    #[test]
    fn test_non_progress_lines_are_rejected() {
        let mut progress = FfmpegProgress::default();
        assert!(progress.apply_line("Invalid data found when processing input").is_err());
        assert!(progress.apply_line("Error opening output file=out.mp4").is_err());
        assert_eq!(progress.apply_line("speed=N/A"), Ok(None));
    }

    #[test]
    fn test_fraction_is_clamped() {
        let progress = FfmpegProgress {
            out_time_ms: 9000,
            ..Default::default()
        };
        assert_eq!(progress.fraction(5000), 1.0);
        assert_eq!(progress.fraction(0), 0.0);
    }
}
