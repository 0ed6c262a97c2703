//! Timebase utilities for telemetry/video synchronization.
//!
//! Telemetry snapshots are keyed by milliseconds since the recorder started;
//! video frames are keyed by output frame index at a fixed fps. This module
//! converts between the two and anchors job wall-clock stamps.

use std::time::Instant;

/// Maps output frame indices onto the telemetry timebase.
///
/// Frame `i` at `fps` sits at `trim_start_ms + i * 1000 / fps` — telemetry
/// timestamps are absolute within the recording, so a trim offset shifts
/// every lookup rather than renumbering frames.
#[derive(Debug, Clone, Copy)]
pub struct FrameClock {
    fps: f64,
    trim_start_ms: u64,
}

impl FrameClock {
    pub fn new(fps: f64) -> Self {
        Self {
            fps: fps.max(1.0),
            trim_start_ms: 0,
        }
    }

    pub fn with_trim_start(mut self, trim_start_ms: u64) -> Self {
        self.trim_start_ms = trim_start_ms;
        self
    }

    /// Absolute telemetry timestamp of output frame `index`.
    pub fn timestamp_ms(&self, index: u64) -> u64 {
        self.trim_start_ms + ((index as f64 / self.fps) * 1000.0).round() as u64
    }

    /// Number of output frames covering `duration_secs` of video.
    pub fn frame_count(&self, duration_secs: f64) -> u64 {
        ((duration_secs * self.fps).ceil() as u64).max(1)
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }
}

/// Wall-clock + monotonic anchor for one render job.
///
/// The monotonic instant drives ETA math; the wall stamp goes into job
/// reports and logs.
#[derive(Debug, Clone)]
pub struct JobClock {
    started: Instant,
    started_wall: String,
}

impl JobClock {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            started_wall: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    pub fn started_wall(&self) -> &str {
        &self.started_wall
    }
}

/// Convert milliseconds to seconds.
pub fn ms_to_secs(ms: u64) -> f64 {
    ms as f64 / 1000.0
}

/// Convert seconds to milliseconds, saturating at zero.
pub fn secs_to_ms(secs: f64) -> u64 {
    (secs.max(0.0) * 1000.0).round() as u64
}
