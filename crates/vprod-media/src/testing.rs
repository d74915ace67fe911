//! Shell-script stand-ins for `ffmpeg` and `ffprobe`.
//!
//! The fake encoder writes a small file to its output path. Its behaviour is
//! keyed on the output file name:
//! - contains `Broken`: writes a partial file, prints an error, exits 1
//! - contains `Silent`: exits 0 but writes a file the fake prober reports as
//!   having no video stream
//!
//! Tests spawning these scripts should run under `#[serial]`: a script that
//! another thread still holds open for writing fails to exec (ETXTBSY).

use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::config::ExtractionConfig;

const FAKE_FFMPEG: &str = r#"#!/bin/sh
for last; do :; done
printf 'frame=1\nout_time_us=500000\nprogress=continue\n' >&2
case "$last" in
  *Broken*)
    printf 'partial' > "$last"
    echo "Conversion failed!" >&2
    exit 1
    ;;
  *Silent*)
    printf 'novideo' > "$last"
    ;;
  *)
    printf 'video' > "$last"
    ;;
esac
printf 'progress=end\n' >&2
exit 0
"#;

const FAKE_FFPROBE: &str = r#"#!/bin/sh
for last; do :; done
[ -f "$last" ] || { echo "$last: No such file or directory" >&2; exit 1; }
if grep -q novideo "$last"; then
  echo '{"streams": []}'
else
  echo '{"streams": [{"codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080, "avg_frame_rate": "30/1"}], "format": {"duration": "12.500000", "size": "1024", "bit_rate": "800000"}}'
fi
"#;

/// A temporary directory holding executable fake tools.
pub struct FakeTools {
    dir: TempDir,
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl FakeTools {
    pub fn install() -> io::Result<Self> {
        let dir = TempDir::new()?;
        let ffmpeg = write_script(dir.path(), "ffmpeg", FAKE_FFMPEG)?;
        let ffprobe = write_script(dir.path(), "ffprobe", FAKE_FFPROBE)?;
        Ok(Self {
            dir,
            ffmpeg,
            ffprobe,
        })
    }

    /// Extraction config pointing at the fakes.
    pub fn config(&self) -> ExtractionConfig {
        ExtractionConfig::default().with_tools(&self.ffmpeg, &self.ffprobe)
    }

    /// Extraction config whose encoder does not exist.
    pub fn config_without_ffmpeg(&self) -> ExtractionConfig {
        ExtractionConfig::default().with_tools(self.dir.path().join("missing-ffmpeg"), &self.ffprobe)
    }

    /// Write a source file the fake prober accepts.
    pub fn write_source(&self, path: &Path) -> io::Result<()> {
        fs::write(path, b"video source")
    }
}

fn write_script(dir: &Path, name: &str, body: &str) -> io::Result<PathBuf> {
    let path = dir.join(name);
    fs::write(&path, body)?;
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755))?;
    Ok(path)
}
