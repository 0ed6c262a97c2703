//! Describe a telemetry file.

use std::path::PathBuf;

use hudburn_telemetry::{normalize, parse_osd, parse_srt, TelemetryTrack};

pub fn run(path: PathBuf) -> anyhow::Result<()> {
    let is_srt = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("srt"))
        .unwrap_or(false);

    if is_srt {
        inspect_srt(&path)
    } else {
        inspect_osd(&path)
    }
}

fn inspect_osd(path: &PathBuf) -> anyhow::Result<()> {
    let raw = std::fs::read(path)?;
    let (track, tag, stats) = parse_osd(&raw)?;
    let (track, profile, used_fallback) = normalize(track, &tag);

    println!("Binary OSD telemetry: {}", path.display());
    println!("  Source tag:  {tag}");
    println!(
        "  Profile:     {}{}",
        profile.name,
        if used_fallback { " (fallback)" } else { "" }
    );
    if let Some(grid) = track.first().and_then(|s| s.grid.as_ref()) {
        println!("  Grid:        {}x{}", grid.cols(), grid.rows());
    }
    print_track_summary(&track);

    if stats != Default::default() {
        println!("  Flight stats:");
        if let Some(t) = &stats.total_arm_time {
            println!("    Arm time:    {t}");
        }
        if let Some(v) = stats.min_battery_v {
            println!("    Min battery: {v:.1} V");
        }
        if let Some(r) = stats.min_rssi_pct {
            println!("    Min RSSI:    {r}%");
        }
        if let Some(a) = stats.max_current_a {
            println!("    Max current: {a:.1} A");
        }
        if let Some(mah) = stats.used_mah {
            println!("    Used:        {mah} mAh");
        }
    }
    Ok(())
}

fn inspect_srt(path: &PathBuf) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(path)?;
    let track = parse_srt(&text)?;

    println!("SRT telemetry: {}", path.display());
    print_track_summary(&track);

    // Field coverage: how many entries carry each bar field.
    let total = track.len();
    let count = |f: fn(&hudburn_telemetry::BarData) -> bool| {
        track
            .iter()
            .filter(|s| s.bar.as_ref().map(f).unwrap_or(false))
            .count()
    };
    println!("  Field coverage ({total} entries):");
    for (label, n) in [
        ("flight time", count(|b| b.flight_time.is_some())),
        ("signal", count(|b| b.signal_dbm.is_some())),
        ("radio 2", count(|b| b.radio2_dbm.is_some())),
        ("link rate", count(|b| b.link_mbps.is_some())),
        ("voltage", count(|b| b.voltage_v.is_some())),
        ("speed", count(|b| b.speed_kmh.is_some())),
        ("altitude", count(|b| b.altitude_m.is_some())),
        ("distance", count(|b| b.distance_m.is_some())),
        ("satellites", count(|b| b.satellites.is_some())),
        ("gps", count(|b| b.gps.is_some())),
    ] {
        if n > 0 {
            println!("    {label:<12} {n}");
        }
    }
    Ok(())
}

fn print_track_summary(track: &TelemetryTrack) {
    println!("  Snapshots:   {}", track.len());
    println!(
        "  Duration:    {:.1}s",
        track.duration_ms() as f64 / 1000.0
    );
}
