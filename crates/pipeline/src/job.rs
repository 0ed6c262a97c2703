//! Overlay job orchestration: one ffmpeg child per job, fed composited
//! RGBA frames over stdin while progress is read back over stdout.
//!
//! Thread layout per running job:
//! - producer: composites overlay frames into a bounded channel;
//! - writer: drains the channel into the child's stdin;
//! - progress reader: parses `-progress pipe:1` lines from stdout;
//! - stderr drain: tails diagnostics so the child never blocks on a
//!   full stderr pipe;
//! - supervisor (the worker thread itself): polls the child, enforces
//!   the cancellation grace period, and assembles the outcome.
//!
//! The bounded channel is the backpressure seam: when the encoder falls
//! behind, the producer blocks on `send` instead of ballooning memory.

use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, SyncSender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use hudburn_common::error::{HudburnError, HudburnResult};
use hudburn_common::timebase::{secs_to_ms, FrameClock, JobClock};
use hudburn_font::GlyphBitmapSet;
use hudburn_render::{Compositor, FrameRenderRequest};
use hudburn_telemetry::TelemetryTrack;

use crate::encoder::{detect_encoder, EncoderProfile, VideoCodec};
use crate::media::{probe_video_stream, VideoStreamInfo};
use crate::progress::{JobProgress, JobStage, ProgressHandle, ProgressState, StallDetector};

/// Frames buffered between the compositor and the encoder's stdin.
const FRAME_QUEUE_DEPTH: usize = 8;

/// Time a cancelled child gets to exit on its own before being killed.
const CANCEL_GRACE: Duration = Duration::from_secs(3);

/// stderr lines retained for diagnostics.
const STDERR_TAIL_LINES: usize = 64;

/// Fixed output resolutions the filter graph can upscale to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpscaleTarget {
    Qhd1440,
    Cine27k,
    Uhd4k,
}

impl UpscaleTarget {
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            UpscaleTarget::Qhd1440 => (2560, 1440),
            UpscaleTarget::Cine27k => (2704, 1520),
            UpscaleTarget::Uhd4k => (3840, 2160),
        }
    }
}

/// User-tunable knobs for one overlay job.
#[derive(Debug, Clone)]
pub struct OverlayOptions {
    pub codec: VideoCodec,
    pub crf: u32,
    pub preset: String,
    pub prefer_hardware: bool,
    pub opacity: f32,
    pub scale: f32,
    pub offset_x: i32,
    pub offset_y: i32,
    pub show_bar: bool,
    pub trim_start_secs: Option<f64>,
    pub trim_end_secs: Option<f64>,
    pub upscale: Option<UpscaleTarget>,
}

impl Default for OverlayOptions {
    fn default() -> Self {
        Self {
            codec: VideoCodec::H264,
            crf: 23,
            preset: "medium".to_string(),
            prefer_hardware: true,
            opacity: 1.0,
            scale: 1.0,
            offset_x: 0,
            offset_y: 0,
            show_bar: true,
            trim_start_secs: None,
            trim_end_secs: None,
            upscale: None,
        }
    }
}

/// One telemetry-overlay encode: source video in, burned-in video out.
///
/// A job starts at most once; the handle it returns is the only way to
/// observe or cancel it.
pub struct OverlayJob {
    pub input: PathBuf,
    pub output: PathBuf,
    pub track: Arc<TelemetryTrack>,
    pub font: Arc<GlyphBitmapSet>,
    pub options: OverlayOptions,
    started: AtomicBool,
}

impl OverlayJob {
    pub fn new(
        input: PathBuf,
        output: PathBuf,
        track: Arc<TelemetryTrack>,
        font: Arc<GlyphBitmapSet>,
        options: OverlayOptions,
    ) -> Self {
        Self {
            input,
            output,
            track,
            font,
            options,
            started: AtomicBool::new(false),
        }
    }

    /// Launch the job on a worker thread.
    ///
    /// A second call on the same job is refused, whether the first run
    /// is still active or already finished.
    pub fn start(self: &Arc<Self>) -> HudburnResult<JobHandle> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(HudburnError::pipeline("job has already been started"));
        }

        let progress = ProgressHandle::default();
        let cancel = Arc::new(AtomicBool::new(false));

        let job = Arc::clone(self);
        let worker_progress = progress.clone();
        let worker_cancel = Arc::clone(&cancel);
        let worker = std::thread::spawn(move || {
            let result = run_job(&job, &worker_progress, worker_cancel);
            match &result {
                Ok(path) => {
                    worker_progress.set_stage(JobStage::Completed);
                    tracing::info!(output = %path.display(), "Overlay job completed");
                }
                Err(HudburnError::Cancelled) => {
                    worker_progress.set_stage(JobStage::Cancelled);
                    tracing::info!("Overlay job cancelled");
                }
                Err(err) => {
                    worker_progress.set_stage(JobStage::Failed);
                    tracing::error!(error = %err, "Overlay job failed");
                }
            }
            result
        });

        Ok(JobHandle {
            progress,
            cancel,
            worker,
        })
    }
}

/// Control surface for a running overlay job.
pub struct JobHandle {
    progress: ProgressHandle,
    cancel: Arc<AtomicBool>,
    worker: JoinHandle<HudburnResult<PathBuf>>,
}

impl JobHandle {
    /// Current progress snapshot; callable from any thread at any time.
    pub fn progress(&self) -> JobProgress {
        self.progress.snapshot()
    }

    /// Request cooperative cancellation. Returns immediately; the job
    /// reaches the `Cancelled` stage once the child is down. Partial
    /// output stays on disk.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Block until the job finishes and return the output path.
    pub fn wait(self) -> HudburnResult<PathBuf> {
        self.worker
            .join()
            .map_err(|_| HudburnError::pipeline("overlay worker thread panicked"))?
    }
}

fn run_job(
    job: &OverlayJob,
    progress: &ProgressHandle,
    cancel: Arc<AtomicBool>,
) -> HudburnResult<PathBuf> {
    let job_clock = JobClock::start();
    progress.set_stage(JobStage::DetectingEncoder);

    let info = probe_video_stream(&job.input)?;
    let encoder = detect_encoder(job.options.codec, job.options.prefer_hardware)?;

    let trim_start = job.options.trim_start_secs.unwrap_or(0.0).max(0.0);
    let mut duration = (info.duration_secs - trim_start).max(0.0);
    if let Some(end) = job.options.trim_end_secs {
        duration = duration.min((end - trim_start).max(0.0));
    }
    if duration <= 0.0 {
        return Err(HudburnError::pipeline(format!(
            "trim window is empty (video is {:.2}s, trim starts at {trim_start:.2}s)",
            info.duration_secs
        )));
    }

    let clock = FrameClock::new(info.fps).with_trim_start(secs_to_ms(trim_start));
    let total_frames = clock.frame_count(duration);

    if !job
        .track
        .overlaps_window(clock.timestamp_ms(0), clock.timestamp_ms(total_frames - 1))
    {
        tracing::warn!(
            track_end_ms = job.track.duration_ms(),
            "Telemetry track does not overlap the encoded window"
        );
    }

    let args = build_ffmpeg_args(job, &info, &encoder, trim_start, duration);
    tracing::debug!(args = ?args, "Running ffmpeg");
    tracing::info!(
        encoder = encoder.label,
        fps = info.fps,
        total_frames,
        width = info.width,
        height = info.height,
        "Starting overlay encode"
    );

    progress.set_stage(JobStage::Encoding);

    let mut child = Command::new("ffmpeg")
        .args(&args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| HudburnError::pipeline(format!("Failed to start ffmpeg: {e}")))?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| HudburnError::pipeline("Failed to capture ffmpeg stdin"))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| HudburnError::pipeline("Failed to capture ffmpeg stdout"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| HudburnError::pipeline("Failed to capture ffmpeg stderr"))?;

    // Drain stderr concurrently so ffmpeg never blocks on a full pipe;
    // only the tail is kept for diagnostics.
    let stderr_task = std::thread::spawn(move || drain_stderr(stderr));

    let progress_reader = progress.clone();
    let progress_clock = job_clock.clone();
    let expected_duration = duration;
    let progress_task = std::thread::spawn(move || {
        read_progress(stdout, progress_reader, expected_duration, progress_clock)
    });

    let (tx, rx) = std::sync::mpsc::sync_channel::<Vec<u8>>(FRAME_QUEUE_DEPTH);
    let writer_task = std::thread::spawn(move || run_writer(rx, stdin));

    let producer_track = Arc::clone(&job.track);
    let producer_font = Arc::clone(&job.font);
    let producer_cancel = Arc::clone(&cancel);
    let mut request = FrameRenderRequest::new(info.width, info.height);
    request.opacity = job.options.opacity;
    request.scale = job.options.scale;
    request.offset_x = job.options.offset_x;
    request.offset_y = job.options.offset_y;
    request.show_bar = job.options.show_bar;
    let producer_task = std::thread::spawn(move || {
        run_producer(
            &producer_track,
            producer_font,
            request,
            clock,
            total_frames,
            tx,
            &producer_cancel,
        )
    });

    let status = supervise_child(&mut child, &cancel)?;

    let frames_sent = producer_task.join().unwrap_or(0);
    let writer_result = writer_task.join().unwrap_or(Ok(()));
    let _ = progress_task.join();
    let stderr_tail = stderr_task
        .join()
        .unwrap_or_else(|_| "<failed to join stderr reader>".to_string());

    tracing::info!(
        started = job_clock.started_wall(),
        elapsed_secs = job_clock.elapsed_secs(),
        frames_sent,
        "Encoder process finished"
    );

    if cancel.load(Ordering::SeqCst) {
        return Err(HudburnError::Cancelled);
    }

    if !status.success() {
        return Err(HudburnError::EncoderProcessFailed {
            status: status.to_string(),
            diagnostic: stderr_tail.trim().to_string(),
        });
    }

    // A broken frame pipe with a clean exit still means frames went missing.
    if let Err(err) = writer_result {
        return Err(HudburnError::channel_io(format!(
            "frame channel broke after {frames_sent} frames: {err}"
        )));
    }

    let output_len = std::fs::metadata(&job.output).map(|m| m.len()).unwrap_or(0);
    if output_len == 0 {
        return Err(HudburnError::pipeline(format!(
            "ffmpeg exited cleanly but produced no output: {}",
            stderr_tail.trim()
        )));
    }

    Ok(job.output.clone())
}

/// Poll the child until exit, enforcing the cancellation grace period.
fn supervise_child(child: &mut Child, cancel: &AtomicBool) -> HudburnResult<std::process::ExitStatus> {
    let mut cancel_seen: Option<Instant> = None;
    loop {
        if let Some(status) = child
            .try_wait()
            .map_err(|e| HudburnError::pipeline(format!("Failed to poll ffmpeg: {e}")))?
        {
            return Ok(status);
        }

        if cancel.load(Ordering::SeqCst) {
            match cancel_seen {
                None => {
                    tracing::info!("Cancellation requested, closing frame channel");
                    cancel_seen = Some(Instant::now());
                }
                Some(since) if since.elapsed() >= CANCEL_GRACE => {
                    tracing::warn!("Grace period elapsed, killing ffmpeg");
                    let _ = child.kill();
                }
                Some(_) => {}
            }
        }

        std::thread::sleep(Duration::from_millis(100));
    }
}

/// Composite frames in order and push them into the encoder channel.
///
/// Frame `i` is rendered exactly once per distinct resolved snapshot; a
/// run of frames resolving to the same snapshot reuses the previous
/// frame's bytes. Returns the number of frames actually sent.
pub(crate) fn run_producer(
    track: &TelemetryTrack,
    font: Arc<GlyphBitmapSet>,
    mut request: FrameRenderRequest,
    clock: FrameClock,
    total_frames: u64,
    tx: SyncSender<Vec<u8>>,
    cancel: &AtomicBool,
) -> u64 {
    let mut compositor = Compositor::new(font, request.width, request.height);
    let mut cached: Option<(Option<u64>, Vec<u8>)> = None;
    let mut sent = 0u64;

    for index in 0..total_frames {
        if cancel.load(Ordering::SeqCst) {
            tracing::debug!(sent, "Producer stopping on cancellation");
            break;
        }

        let time_ms = clock.timestamp_ms(index);
        let snapshot = track.snapshot_at(time_ms);
        let key = snapshot.map(|s| s.time_ms);

        let bytes = match &cached {
            Some((cached_key, bytes)) if *cached_key == key => bytes.clone(),
            _ => {
                request.time_ms = time_ms;
                let frame = compositor.render(snapshot, &request).to_vec();
                cached = Some((key, frame.clone()));
                frame
            }
        };

        // Blocks when the queue is full: encoder backpressure.
        if tx.send(bytes).is_err() {
            tracing::debug!(sent, "Frame channel closed, producer stopping");
            break;
        }
        sent += 1;
    }

    sent
}

fn run_writer(rx: Receiver<Vec<u8>>, mut stdin: ChildStdin) -> std::io::Result<()> {
    for frame in rx {
        stdin.write_all(&frame)?;
    }
    // Dropping stdin closes the pipe and lets ffmpeg finalize the output.
    Ok(())
}

fn read_progress(
    stdout: ChildStdout,
    progress: ProgressHandle,
    expected_duration_secs: f64,
    job_clock: JobClock,
) {
    let mut reader = BufReader::new(stdout);
    let mut line = String::new();
    let mut state = ProgressState::default();
    let mut detector = StallDetector::new();
    let mut was_stalled = false;

    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let Some((key, value)) = line.trim().split_once('=') else {
            continue;
        };
        state.update(key, value);
        if key == "progress" {
            if state.complete {
                // The stream is fully written; the exit status still
                // decides whether the job counts as completed.
                progress.mark_output_complete();
                continue;
            }
            let stalled = detector.observe(state.out_time_secs);
            progress.set_out_time(
                state.out_time_secs,
                expected_duration_secs,
                job_clock.elapsed_secs(),
            );
            progress.set_stalled(stalled);
            if stalled && !was_stalled {
                tracing::warn!(
                    out_time_secs = state.out_time_secs,
                    "No encoder output advancement, job may be stalled"
                );
            }
            was_stalled = stalled;
        }
    }
}

fn drain_stderr(stderr: impl Read) -> String {
    let reader = BufReader::new(stderr);
    let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);
    for line in reader.lines() {
        let Ok(line) = line else { break };
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    tail.into_iter().collect::<Vec<_>>().join("\n")
}

/// Assemble the full ffmpeg invocation for one job.
///
/// Input 0 is the source video (optionally seeked), input 1 the raw RGBA
/// overlay stream on stdin at the source frame rate. The overlay filter
/// composites them natively; audio is passed through untouched.
fn build_ffmpeg_args(
    job: &OverlayJob,
    info: &VideoStreamInfo,
    encoder: &EncoderProfile,
    trim_start_secs: f64,
    duration_secs: f64,
) -> Vec<String> {
    let mut args: Vec<String> = vec!["-hide_banner".into(), "-y".into()];

    if trim_start_secs > 0.0 {
        args.push("-ss".into());
        args.push(format!("{trim_start_secs:.3}"));
    }
    args.push("-i".into());
    args.push(job.input.display().to_string());

    args.extend([
        "-f".into(),
        "rawvideo".into(),
        "-pix_fmt".into(),
        "rgba".into(),
        "-video_size".into(),
        format!("{}x{}", info.width, info.height),
        "-framerate".into(),
        format!("{}", info.fps),
        "-i".into(),
        "pipe:0".into(),
    ]);

    let mut filter = "[0:v][1:v]overlay=0:0:format=auto".to_string();
    if let Some(target) = job.options.upscale {
        let (w, h) = target.dimensions();
        filter.push_str(&format!(",scale={w}:{h}:flags=lanczos"));
    }
    filter.push_str("[out]");
    args.extend(["-filter_complex".into(), filter]);

    args.extend([
        "-map".into(),
        "[out]".into(),
        "-map".into(),
        "0:a?".into(),
        "-c:a".into(),
        "copy".into(),
    ]);

    args.push("-c:v".into());
    args.push(encoder.encoder_name(job.options.codec).to_string());
    args.extend(encoder.rate_control_args(job.options.codec, job.options.crf, &job.options.preset));
    args.extend(["-pix_fmt".into(), "yuv420p".into()]);

    if job.options.trim_end_secs.is_some() {
        args.push("-t".into());
        args.push(format!("{duration_secs:.3}"));
    }

    args.extend([
        "-movflags".into(),
        "+faststart".into(),
        "-progress".into(),
        "pipe:1".into(),
        "-nostats".into(),
    ]);

    args.push(job.output.display().to_string());
    args
}
