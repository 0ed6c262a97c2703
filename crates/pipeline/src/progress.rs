//! Job state and ffmpeg `-progress pipe:1` parsing.

use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Lifecycle of one overlay job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStage {
    Idle,
    DetectingEncoder,
    Encoding,
    Completed,
    Failed,
    Cancelled,
}

impl JobStage {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStage::Completed | JobStage::Failed | JobStage::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStage::Idle => "idle",
            JobStage::DetectingEncoder => "detecting-encoder",
            JobStage::Encoding => "encoding",
            JobStage::Completed => "completed",
            JobStage::Failed => "failed",
            JobStage::Cancelled => "cancelled",
        }
    }
}

/// Snapshot of a running job, readable at any time from any thread.
#[derive(Debug, Clone)]
pub struct JobProgress {
    /// Completion in `[0, 100]`, monotonically non-decreasing.
    pub percent: f64,
    pub stage: JobStage,
    /// True while encoded output has not advanced past the liveness
    /// threshold. Informational; stalls are never fatal by themselves.
    pub stalled: bool,
    /// Encoded output position in seconds.
    pub out_time_secs: f64,
    /// Wall-clock seconds since the job started.
    pub elapsed_secs: f64,
    /// Remaining-time estimate extrapolated from percent and elapsed;
    /// zero until the first progress report lands.
    pub eta_secs: f64,
}

impl Default for JobProgress {
    fn default() -> Self {
        Self {
            percent: 0.0,
            stage: JobStage::Idle,
            stalled: false,
            out_time_secs: 0.0,
            elapsed_secs: 0.0,
            eta_secs: 0.0,
        }
    }
}

/// Shared, thread-safe view of a job's progress.
///
/// Writers funnel through methods that enforce percent monotonicity and
/// legal stage flow; readers clone the current snapshot.
#[derive(Debug, Clone, Default)]
pub struct ProgressHandle {
    inner: Arc<Mutex<JobProgress>>,
}

impl ProgressHandle {
    pub fn snapshot(&self) -> JobProgress {
        self.inner.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn set_stage(&self, stage: JobStage) {
        if let Ok(mut p) = self.inner.lock() {
            p.stage = stage;
            if stage == JobStage::Completed {
                p.percent = 100.0;
                p.stalled = false;
                p.eta_secs = 0.0;
            }
        }
    }

    /// Record an encoded-output position; percent never moves backwards.
    /// `elapsed_secs` is the job's wall-clock age and feeds the ETA.
    pub fn set_out_time(&self, out_time_secs: f64, expected_duration_secs: f64, elapsed_secs: f64) {
        if let Ok(mut p) = self.inner.lock() {
            p.out_time_secs = out_time_secs.max(p.out_time_secs);
            if expected_duration_secs > 0.0 {
                let pct = (out_time_secs / expected_duration_secs * 100.0).clamp(0.0, 100.0);
                p.percent = p.percent.max(pct);
            }
            p.elapsed_secs = elapsed_secs;
            p.eta_secs = if p.percent > 0.0 {
                (elapsed_secs * 100.0 / p.percent - elapsed_secs).max(0.0)
            } else {
                0.0
            };
        }
    }

    /// Pin percent at 100 once the encoder reports the stream finished.
    /// The stage stays where it is; the exit status decides the outcome.
    pub fn mark_output_complete(&self) {
        if let Ok(mut p) = self.inner.lock() {
            p.percent = 100.0;
            p.eta_secs = 0.0;
            p.stalled = false;
        }
    }

    pub fn set_stalled(&self, stalled: bool) {
        if let Ok(mut p) = self.inner.lock() {
            p.stalled = stalled;
        }
    }
}

/// Accumulator for ffmpeg key=value progress lines.
#[derive(Debug, Default)]
pub(crate) struct ProgressState {
    pub out_time_secs: f64,
    pub complete: bool,
}

impl ProgressState {
    pub fn update(&mut self, key: &str, value: &str) {
        match key {
            "out_time_ms" | "out_time_us" => {
                // Despite the name, ffmpeg emits microseconds for both keys.
                if let Ok(us) = value.parse::<f64>() {
                    self.out_time_secs = us / 1_000_000.0;
                }
            }
            "progress" => {
                self.complete = value == "end";
            }
            _ => {}
        }
    }
}

/// Seconds without output advancement before a job is reported stalled.
pub(crate) const STALL_THRESHOLD_SECS: u64 = 10;

/// Tracks output liveness across progress reports.
pub(crate) struct StallDetector {
    last_advance: Instant,
    last_out_time: f64,
}

impl StallDetector {
    pub fn new() -> Self {
        Self {
            last_advance: Instant::now(),
            last_out_time: 0.0,
        }
    }

    /// Feed the latest output position; returns whether the job counts
    /// as stalled right now.
    pub fn observe(&mut self, out_time_secs: f64) -> bool {
        if out_time_secs > self.last_out_time + 0.001 {
            self.last_out_time = out_time_secs;
            self.last_advance = Instant::now();
            return false;
        }
        self.last_advance.elapsed().as_secs() >= STALL_THRESHOLD_SECS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_state_parses_out_time() {
        let mut state = ProgressState::default();
        state.update("out_time_us", "2500000");
        assert!((state.out_time_secs - 2.5).abs() < 1e-9);
        state.update("out_time_ms", "3500000");
        assert!((state.out_time_secs - 3.5).abs() < 1e-9);
        state.update("frame", "42");
        assert!(!state.complete);
        state.update("progress", "end");
        assert!(state.complete);
    }

    #[test]
    fn test_percent_is_monotonic() {
        let handle = ProgressHandle::default();
        handle.set_out_time(5.0, 10.0, 1.0);
        assert!((handle.snapshot().percent - 50.0).abs() < 1e-9);

        // A backwards out_time report never lowers the percent.
        handle.set_out_time(3.0, 10.0, 2.0);
        assert!((handle.snapshot().percent - 50.0).abs() < 1e-9);

        handle.set_out_time(10.0, 10.0, 3.0);
        assert!((handle.snapshot().percent - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_eta_extrapolates_from_elapsed() {
        let handle = ProgressHandle::default();
        // Half done after 30s of wall clock: 30s left.
        handle.set_out_time(5.0, 10.0, 30.0);
        let p = handle.snapshot();
        assert!((p.elapsed_secs - 30.0).abs() < 1e-9);
        assert!((p.eta_secs - 30.0).abs() < 1e-9);

        // Fully done: nothing left, regardless of elapsed.
        handle.set_out_time(10.0, 10.0, 60.0);
        assert!(handle.snapshot().eta_secs.abs() < 1e-9);
    }

    #[test]
    fn test_completed_stage_pins_percent() {
        let handle = ProgressHandle::default();
        handle.set_out_time(1.0, 10.0, 5.0);
        handle.set_stage(JobStage::Completed);
        let p = handle.snapshot();
        assert_eq!(p.stage, JobStage::Completed);
        assert!((p.percent - 100.0).abs() < 1e-9);
        assert!(p.eta_secs.abs() < 1e-9);
    }

    #[test]
    fn test_output_complete_pins_percent_without_stage_change() {
        let handle = ProgressHandle::default();
        handle.set_stage(JobStage::Encoding);
        handle.set_out_time(1.0, 10.0, 5.0);
        handle.set_stalled(true);
        handle.mark_output_complete();
        let p = handle.snapshot();
        assert_eq!(p.stage, JobStage::Encoding);
        assert!((p.percent - 100.0).abs() < 1e-9);
        assert!(!p.stalled);
    }

    #[test]
    fn test_stall_detector_resets_on_advance() {
        let mut detector = StallDetector::new();
        assert!(!detector.observe(1.0));
        assert!(!detector.observe(2.0));
        // No advancement, but the threshold has not elapsed either.
        assert!(!detector.observe(2.0));
    }

    #[test]
    fn test_terminal_stages() {
        assert!(JobStage::Completed.is_terminal());
        assert!(JobStage::Failed.is_terminal());
        assert!(JobStage::Cancelled.is_terminal());
        assert!(!JobStage::Encoding.is_terminal());
    }
}
