//! Hudburn CLI — burn drone telemetry overlays into DVR video.
//!
//! Usage:
//!   hudburn render [OPTIONS]   Overlay telemetry onto a video
//!   hudburn inspect <PATH>     Describe a telemetry file
//!   hudburn check              Check ffmpeg and encoder availability

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "hudburn",
    about = "FPV telemetry overlay renderer for drone DVR footage",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Overlay telemetry onto a video file
    Render {
        /// Source DVR video
        #[arg(short, long)]
        input: PathBuf,

        /// Binary OSD telemetry file
        #[arg(long)]
        osd: Option<PathBuf>,

        /// SRT subtitle telemetry file
        #[arg(long)]
        srt: Option<PathBuf>,

        /// Font folder holding the OSD glyph sheets
        #[arg(long)]
        font_dir: Option<PathBuf>,

        /// Output video path
        #[arg(short, long)]
        output: PathBuf,

        /// Output codec: h264 or h265
        #[arg(long, default_value = "h264")]
        codec: String,

        /// Quality (CRF for software encoders)
        #[arg(long)]
        crf: Option<u32>,

        /// Encoder preset name
        #[arg(long)]
        preset: Option<String>,

        /// Force software encoding, skipping the hardware probe
        #[arg(long)]
        no_hw: bool,

        /// Extra multiplier on the auto-fit OSD scale
        #[arg(long, default_value = "1.0")]
        scale: f32,

        /// Horizontal OSD nudge in output pixels
        #[arg(long, default_value = "0")]
        offset_x: i32,

        /// Vertical OSD nudge in output pixels
        #[arg(long, default_value = "0")]
        offset_y: i32,

        /// Overlay opacity [0.0, 1.0]
        #[arg(long, default_value = "1.0")]
        opacity: f32,

        /// Hide the bottom telemetry bar
        #[arg(long)]
        no_bar: bool,

        /// Start of the encode window (seconds into the video)
        #[arg(long)]
        trim_start: Option<f64>,

        /// End of the encode window (seconds into the video)
        #[arg(long)]
        trim_end: Option<f64>,

        /// Upscale output: 1440p, 2.7k, or 4k
        #[arg(long)]
        upscale: Option<String>,
    },

    /// Describe a telemetry file (tag, profile, frames, duration, fields)
    Inspect {
        /// Path to a .osd or .srt telemetry file
        path: PathBuf,
    },

    /// Check ffmpeg presence and encoder availability
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    hudburn_common::logging::init_logging(&hudburn_common::config::LoggingConfig {
        level: log_level.to_string(),
        json: false,
        file: None,
    });

    match cli.command {
        Commands::Render {
            input,
            osd,
            srt,
            font_dir,
            output,
            codec,
            crf,
            preset,
            no_hw,
            scale,
            offset_x,
            offset_y,
            opacity,
            no_bar,
            trim_start,
            trim_end,
            upscale,
        } => {
            commands::render::run(commands::render::RenderArgs {
                input,
                osd,
                srt,
                font_dir,
                output,
                codec,
                crf,
                preset,
                no_hw,
                scale,
                offset_x,
                offset_y,
                opacity,
                no_bar,
                trim_start,
                trim_end,
                upscale,
            })
            .await
        }
        Commands::Inspect { path } => commands::inspect::run(path),
        Commands::Check => commands::check::run(),
    }
}
