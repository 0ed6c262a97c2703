//! Hudburn Pipeline
//!
//! Orchestrates one ffmpeg child per overlay job: encoder selection with
//! a process-wide cached hardware probe, overlay frame production over a
//! bounded channel into the child's stdin, progress and stall reporting,
//! and cooperative cancellation.

pub mod encoder;
pub mod job;
pub mod media;
pub mod progress;

pub use encoder::{detect_encoder, EncoderProfile, VideoCodec};
pub use job::{JobHandle, OverlayJob, OverlayOptions, UpscaleTarget};
pub use media::{probe_video_stream, VideoStreamInfo};
pub use progress::{JobProgress, JobStage};

use std::path::PathBuf;
use std::sync::Arc;

use hudburn_common::error::{HudburnError, HudburnResult};

/// Run an overlay job to completion on the blocking thread pool.
///
/// Convenience for callers that do not need mid-flight progress or
/// cancellation; everything else should go through `OverlayJob::start`.
pub async fn render_overlay(job: OverlayJob) -> HudburnResult<PathBuf> {
    tokio::task::spawn_blocking(move || {
        let job = Arc::new(job);
        let handle = job.start()?;
        handle.wait()
    })
    .await
    .map_err(|e| HudburnError::pipeline(format!("overlay task panicked: {e}")))?
}
