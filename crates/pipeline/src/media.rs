//! Source video probing via ffprobe.

use std::path::Path;
use std::process::Command;

use hudburn_common::error::{HudburnError, HudburnResult};

/// Geometry and timing of the source video's first video stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoStreamInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub duration_secs: f64,
}

/// Probe the first video stream of `path`.
pub fn probe_video_stream(path: &Path) -> HudburnResult<VideoStreamInfo> {
    if !path.is_file() {
        return Err(HudburnError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height,r_frame_rate",
            "-show_entries",
            "format=duration",
            "-of",
            "json",
        ])
        .arg(path)
        .output()
        .map_err(|e| HudburnError::pipeline(format!("Failed to run ffprobe: {e}")))?;

    if !output.status.success() {
        return Err(HudburnError::pipeline(format!(
            "ffprobe failed on {}: {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let parsed: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    parse_probe_json(&parsed).ok_or_else(|| {
        HudburnError::pipeline(format!("No video stream found in {}", path.display()))
    })
}

fn parse_probe_json(value: &serde_json::Value) -> Option<VideoStreamInfo> {
    let stream = value.get("streams")?.get(0)?;
    let width = stream.get("width")?.as_u64()? as u32;
    let height = stream.get("height")?.as_u64()? as u32;
    let fps = parse_rate(stream.get("r_frame_rate")?.as_str()?)?;

    let duration_secs = value
        .get("format")
        .and_then(|f| f.get("duration"))
        .and_then(|d| d.as_str())
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    if width == 0 || height == 0 || fps <= 0.0 {
        return None;
    }
    Some(VideoStreamInfo {
        width,
        height,
        fps,
        duration_secs,
    })
}

/// ffprobe rates come as a fraction, e.g. "30000/1001".
fn parse_rate(raw: &str) -> Option<f64> {
    match raw.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            if den == 0.0 {
                None
            } else {
                Some(num / den)
            }
        }
        None => raw.parse().ok(),
    }
}
