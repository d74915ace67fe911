//! FFprobe: source information and the structural publish gate.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use vprod_models::VideoInfo;

use crate::error::{MediaError, MediaResult};

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    size: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
}

impl FfprobeStream {
    fn is_video(&self) -> bool {
        self.codec_type.as_deref() == Some("video")
    }
}

/// Resolve the ffprobe binary, failing if it cannot be found.
pub fn check_ffprobe(binary: &Path) -> MediaResult<PathBuf> {
    which::which(binary).map_err(|_| MediaError::FfprobeNotFound(binary.display().to_string()))
}

async fn run_ffprobe(binary: &Path, args: &[&str], path: &Path) -> MediaResult<FfprobeOutput> {
    let binary = check_ffprobe(binary)?;

    let output = Command::new(binary)
        .args(args)
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::ffprobe_failed(
            format!("FFprobe exited with {}", output.status),
            Some(String::from_utf8_lossy(&output.stderr).to_string()),
        ));
    }

    Ok(serde_json::from_slice(&output.stdout)?)
}

/// Probe a video file for information.
pub async fn probe_video(ffprobe: &Path, path: impl AsRef<Path>) -> MediaResult<VideoInfo> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    let probe = run_ffprobe(
        ffprobe,
        &["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"],
        path,
    )
    .await?;

    let video_stream = probe
        .streams
        .iter()
        .find(|s| s.is_video())
        .ok_or_else(|| MediaError::InvalidVideo("No video stream found".to_string()))?;

    let format = probe.format.as_ref();
    let parse_u64 = |v: Option<&String>| v.and_then(|s| s.parse::<u64>().ok()).unwrap_or(0);

    let duration = format
        .and_then(|f| f.duration.as_ref())
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    let fps = video_stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .or_else(|| video_stream.r_frame_rate.as_deref().and_then(parse_frame_rate))
        .unwrap_or(30.0);

    Ok(VideoInfo {
        duration,
        width: video_stream.width.unwrap_or(0),
        height: video_stream.height.unwrap_or(0),
        fps,
        codec: video_stream.codec_name.clone().unwrap_or_default(),
        size: parse_u64(format.and_then(|f| f.size.as_ref())),
        bitrate: parse_u64(format.and_then(|f| f.bit_rate.as_ref())),
    })
}

/// Confirm that `path` holds a decodable video stream.
///
/// Any failure (tool exit, unreadable output, no video stream) is reported as
/// [`MediaError::ProbeFailed`] except a missing ffprobe binary, which stays a
/// precondition error.
pub async fn verify_video_stream(ffprobe: &Path, path: &Path) -> MediaResult<()> {
    let probe = run_ffprobe(
        ffprobe,
        &[
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=codec_type",
            "-of",
            "json",
        ],
        path,
    )
    .await;

    match probe {
        Ok(out) if out.streams.iter().any(FfprobeStream::is_video) => Ok(()),
        Err(e @ MediaError::FfprobeNotFound(_)) => Err(e),
        Ok(_) | Err(_) => Err(MediaError::ProbeFailed(path.to_path_buf())),
    }
}

/// Parse frame rate string (e.g., "30/1" or "29.97").
fn parse_frame_rate(s: &str) -> Option<f64> {
    if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        return (den > 0.0 && num > 0.0).then(|| num / den);
    }
    s.parse().ok()
}
