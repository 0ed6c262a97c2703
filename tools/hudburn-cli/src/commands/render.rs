//! Overlay telemetry onto a video.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use hudburn_common::config::AppConfig;
use hudburn_font::{load_bitmaps, FontVariant};
use hudburn_pipeline::{OverlayJob, OverlayOptions, UpscaleTarget, VideoCodec};
use hudburn_telemetry::{normalize, parse_osd, parse_srt, SourceProfile, TelemetryTrack};

pub struct RenderArgs {
    pub input: PathBuf,
    pub osd: Option<PathBuf>,
    pub srt: Option<PathBuf>,
    pub font_dir: Option<PathBuf>,
    pub output: PathBuf,
    pub codec: String,
    pub crf: Option<u32>,
    pub preset: Option<String>,
    pub no_hw: bool,
    pub scale: f32,
    pub offset_x: i32,
    pub offset_y: i32,
    pub opacity: f32,
    pub no_bar: bool,
    pub trim_start: Option<f64>,
    pub trim_end: Option<f64>,
    pub upscale: Option<String>,
}

pub async fn run(args: RenderArgs) -> anyhow::Result<()> {
    tokio::task::spawn_blocking(move || run_blocking(args)).await?
}

fn run_blocking(args: RenderArgs) -> anyhow::Result<()> {
    let config = AppConfig::load();

    let (track, profile) = load_telemetry(&args)?;
    println!(
        "Telemetry: {} snapshots over {:.1}s ({})",
        track.len(),
        track.duration_ms() as f64 / 1000.0,
        profile.name
    );

    let font_folder = args
        .font_dir
        .clone()
        .unwrap_or_else(|| config.fonts_dir.join(default_font_folder(&profile)));
    let variant = if config.encoding.prefer_hd_fonts {
        FontVariant::Hd
    } else {
        FontVariant::Sd
    };
    let font = load_bitmaps(&font_folder, variant)
        .map_err(|e| anyhow::anyhow!("Failed to load font from {}: {e}", font_folder.display()))?;
    println!(
        "Font: {} ({} glyphs, {}x{})",
        font.name(),
        font.glyph_count(),
        font.tile_w(),
        font.tile_h()
    );

    let options = OverlayOptions {
        codec: parse_codec(&args.codec)?,
        crf: args.crf.unwrap_or(config.encoding.crf as u32),
        preset: args
            .preset
            .clone()
            .unwrap_or_else(|| config.encoding.preset.clone()),
        prefer_hardware: !args.no_hw && config.encoding.prefer_hardware,
        opacity: args.opacity,
        scale: args.scale,
        offset_x: args.offset_x,
        offset_y: args.offset_y,
        show_bar: !args.no_bar,
        trim_start_secs: args.trim_start,
        trim_end_secs: args.trim_end,
        upscale: args.upscale.as_deref().map(parse_upscale).transpose()?,
    };

    let output_path = args.output.clone();
    let job = Arc::new(OverlayJob::new(
        args.input,
        args.output,
        Arc::new(track),
        Arc::new(font),
        options,
    ));
    let handle = job.start()?;

    loop {
        let p = handle.progress();
        let eta = if p.eta_secs > 0.0 {
            format!("  ETA {:3.0}s", p.eta_secs)
        } else {
            String::new()
        };
        print!(
            "\r  [{}] {:5.1}%{}{}    ",
            p.stage.as_str(),
            p.percent,
            eta,
            if p.stalled { "  (stalled)" } else { "" }
        );
        let _ = std::io::stdout().flush();
        if p.stage.is_terminal() {
            break;
        }
        std::thread::sleep(Duration::from_millis(200));
    }
    println!();

    match handle.wait() {
        Ok(output) => {
            println!("Done: {}", output.display());
            Ok(())
        }
        Err(err) => {
            if err.is_recoverable() {
                println!(
                    "Stopped early; partial output may remain at {}",
                    output_path.display()
                );
            }
            Err(err.into())
        }
    }
}

/// Parse the requested telemetry inputs and merge them into one track.
///
/// With both inputs, the OSD grid track is primary and each snapshot
/// picks up the bar fields from the SRT entry in force at its timestamp.
fn load_telemetry(args: &RenderArgs) -> anyhow::Result<(TelemetryTrack, SourceProfile)> {
    let srt_track = args
        .srt
        .as_ref()
        .map(|path| -> anyhow::Result<TelemetryTrack> {
            let text = std::fs::read_to_string(path)?;
            Ok(parse_srt(&text)?)
        })
        .transpose()?;

    match &args.osd {
        Some(path) => {
            let raw = std::fs::read(path)?;
            let (track, tag, stats) = parse_osd(&raw)?;
            if let Some(arm_time) = &stats.total_arm_time {
                tracing::info!(arm_time, "Flight stats found on first frame");
            }
            let (track, profile, used_fallback) = normalize(track, &tag);
            if used_fallback {
                println!(
                    "Warning: unknown source tag '{tag}', rendering with the {} profile",
                    profile.name
                );
            }
            let track = match srt_track {
                Some(srt) => merge_tracks(track, &srt),
                None => track,
            };
            Ok((track, profile))
        }
        None => {
            let track = srt_track
                .ok_or_else(|| anyhow::anyhow!("Provide at least one of --osd or --srt"))?;
            Ok((track, SourceProfile::all()[0]))
        }
    }
}

/// Attach SRT bar fields to each OSD snapshot by timestamp.
fn merge_tracks(osd: TelemetryTrack, srt: &TelemetryTrack) -> TelemetryTrack {
    let mut merged = TelemetryTrack::new();
    for snapshot in osd.iter() {
        let mut snapshot = snapshot.clone();
        if snapshot.bar.is_none() {
            snapshot.bar = srt
                .snapshot_at(snapshot.time_ms)
                .and_then(|s| s.bar.clone());
        }
        merged.push(snapshot);
    }
    merged
}

fn default_font_folder(profile: &SourceProfile) -> String {
    profile.font_prefixes[0].trim_end_matches('_').to_string()
}

fn parse_codec(raw: &str) -> anyhow::Result<VideoCodec> {
    match raw {
        "h264" => Ok(VideoCodec::H264),
        "h265" | "hevc" => Ok(VideoCodec::H265),
        other => Err(anyhow::anyhow!("Unknown codec: {other}. Use: h264, h265")),
    }
}

fn parse_upscale(raw: &str) -> anyhow::Result<UpscaleTarget> {
    match raw.to_ascii_lowercase().as_str() {
        "1440p" => Ok(UpscaleTarget::Qhd1440),
        "2.7k" => Ok(UpscaleTarget::Cine27k),
        "4k" => Ok(UpscaleTarget::Uhd4k),
        other => Err(anyhow::anyhow!(
            "Unknown upscale target: {other}. Use: 1440p, 2.7k, 4k"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hudburn_telemetry::{BarData, TelemetrySnapshot};

    fn snap(time_ms: u64, bar: Option<BarData>) -> TelemetrySnapshot {
        TelemetrySnapshot {
            time_ms,
            seq: None,
            grid: None,
            bar,
        }
    }

    #[test]
    fn test_merge_attaches_bar_by_timestamp() {
        let mut osd = TelemetryTrack::new();
        osd.push(snap(500, None));
        osd.push(snap(1500, None));

        let mut srt = TelemetryTrack::new();
        srt.push(snap(
            1000,
            Some(BarData {
                voltage_v: Some(16.0),
                ..Default::default()
            }),
        ));

        let merged = merge_tracks(osd, &srt);
        // First snapshot precedes all SRT entries; no bar to attach.
        assert!(merged.first().unwrap().bar.is_none());
        assert_eq!(
            merged.last().unwrap().bar.as_ref().unwrap().voltage_v,
            Some(16.0)
        );
    }

    #[test]
    fn test_upscale_and_codec_parsing() {
        assert_eq!(parse_upscale("4K").unwrap(), UpscaleTarget::Uhd4k);
        assert_eq!(parse_upscale("1440p").unwrap(), UpscaleTarget::Qhd1440);
        assert!(parse_upscale("8k").is_err());
        assert_eq!(parse_codec("hevc").unwrap(), VideoCodec::H265);
        assert!(parse_codec("av1").is_err());
    }
}
