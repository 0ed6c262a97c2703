//! SRT subtitle telemetry parser.
//!
//! Digital FPV systems can record telemetry as a standard subtitle file
//! alongside the DVR: each entry carries one or two free-text lines such as
//!
//! ```text
//! 1
//! 00:00:01,000 --> 00:00:02,000
//! D: 132m  H: 48m  52.2297, 21.0122  15.8 V
//! 02:15  Radio 1: -64 dBm  11 SNR  42.1 Mbps
//! ```
//!
//! Field labels vary per system configuration, so extraction is pattern
//! based: recognisable values are pulled out, unknown labels are ignored,
//! and "No MAVLink telemetry" placeholder lines are skipped entirely.

use std::sync::OnceLock;

use regex::Regex;

use hudburn_common::error::{HudburnError, HudburnResult};

use crate::track::{BarData, TelemetrySnapshot, TelemetryTrack};

fn re(cell: &'static OnceLock<Regex>, pattern: &'static str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static regex"))
}

static TS_RE: OnceLock<Regex> = OnceLock::new();
static SKIP_RE: OnceLock<Regex> = OnceLock::new();
static RADIO_RE: OnceLock<Regex> = OnceLock::new();
static MBPS_RE: OnceLock<Regex> = OnceLock::new();
static TIME_RE: OnceLock<Regex> = OnceLock::new();
static DIST_RE: OnceLock<Regex> = OnceLock::new();
static ALT_RE: OnceLock<Regex> = OnceLock::new();
static SPEED_RE: OnceLock<Regex> = OnceLock::new();
static SATS_RE: OnceLock<Regex> = OnceLock::new();
static VOLT_RE: OnceLock<Regex> = OnceLock::new();
static GPS_RE: OnceLock<Regex> = OnceLock::new();

fn ts_re() -> &'static Regex {
    re(
        &TS_RE,
        r"(\d{2}):(\d{2}):(\d{2}),(\d{3})\s*-->\s*(\d{2}):(\d{2}):(\d{2}),(\d{3})",
    )
}

/// Parse SRT telemetry text into a track of bar-data snapshots.
///
/// Each snapshot is keyed by its entry's start timestamp. Fails with
/// `EmptyTrack` when the file contains no entries at all.
pub fn parse_srt(text: &str) -> HudburnResult<TelemetryTrack> {
    let mut track = TelemetryTrack::new();

    let mut index: Option<u32> = None;
    let mut start_ms: u64 = 0;
    let mut lines: Vec<String> = Vec::new();
    let mut saw_timestamp = false;

    let mut flush = |index: &mut Option<u32>,
                     start_ms: u64,
                     saw_timestamp: bool,
                     lines: &mut Vec<String>,
                     track: &mut TelemetryTrack| {
        if index.is_some() && saw_timestamp {
            track.push(TelemetrySnapshot {
                time_ms: start_ms,
                seq: *index,
                grid: None,
                bar: Some(parse_entry_lines(lines)),
            });
        }
        *index = None;
        lines.clear();
    };

    for raw_line in text.lines() {
        let line = raw_line.trim();

        if line.is_empty() {
            flush(&mut index, start_ms, saw_timestamp, &mut lines, &mut track);
            saw_timestamp = false;
            continue;
        }

        if index.is_none() && line.chars().all(|c| c.is_ascii_digit()) {
            index = line.parse().ok();
            continue;
        }

        if let Some(caps) = ts_re().captures(line) {
            if index.is_some() && lines.is_empty() {
                start_ms = caps_to_ms(&caps, 1);
                saw_timestamp = true;
                continue;
            }
        }

        lines.push(line.to_string());
    }
    // A file without a trailing blank line still flushes its last entry.
    flush(&mut index, start_ms, saw_timestamp, &mut lines, &mut track);

    if track.is_empty() {
        return Err(HudburnError::EmptyTrack);
    }

    tracing::info!(
        entries = track.len(),
        duration_ms = track.duration_ms(),
        "Parsed SRT telemetry"
    );

    Ok(track)
}

fn caps_to_ms(caps: &regex::Captures<'_>, first_group: usize) -> u64 {
    let get = |i: usize| caps[first_group + i].parse::<u64>().unwrap_or(0);
    get(0) * 3_600_000 + get(1) * 60_000 + get(2) * 1_000 + get(3)
}

fn ft_to_m(ft: f64) -> f64 {
    ft / 3.28084
}

fn parse_entry_lines(lines: &[String]) -> BarData {
    let skip = re(&SKIP_RE, r"(?i)No MAVLink telemetry");
    let radio = re(&RADIO_RE, r"(?i)Radio\s+(\d+):\s*(-?\d+)\s*dBm(?:\s+(-?\d+)\s*SNR)?");
    let mbps = re(&MBPS_RE, r"(?i)([\d.]+)\s*Mbps");
    let time = re(&TIME_RE, r"^\s*(\d{2}):(\d{2})\b");
    let dist = re(&DIST_RE, r"(?i)D:\s*([\d.]+)\s*(m|ft)");
    let alt = re(&ALT_RE, r"(?i)H:\s*([\d.]+)\s*(m|ft)");
    let speed = re(&SPEED_RE, r"(?i)\bS(?:PD)?:\s*([\d.]+)\s*(km/h|mph)");
    let sats = re(&SATS_RE, r"(?i)Sats?:\s*(\d+)");
    let volt = re(&VOLT_RE, r"([\d.]+)\s*V\b");
    let gps = re(&GPS_RE, r"(-?\d+\.\d+)\s*,\s*(-?\d+\.\d+)");

    let mut bar = BarData::default();

    for line in lines {
        if skip.is_match(line) {
            continue;
        }

        if bar.flight_time.is_none() {
            if let Some(m) = time.captures(line) {
                bar.flight_time = Some(format!("{}:{}", &m[1], &m[2]));
            }
        }

        for m in radio.captures_iter(line) {
            let dbm: i32 = m[2].parse().unwrap_or(0);
            let snr: Option<i32> = m.get(3).and_then(|g| g.as_str().parse().ok());
            match &m[1] {
                "1" => {
                    bar.signal_dbm = Some(dbm);
                    if snr.is_some() {
                        bar.signal_snr = snr;
                    }
                }
                "2" => {
                    bar.radio2_dbm = Some(dbm);
                    if snr.is_some() {
                        bar.radio2_snr = snr;
                    }
                }
                _ => {}
            }
        }

        if let Some(m) = mbps.captures(line) {
            bar.link_mbps = m[1].parse().ok();
        }

        if let Some(m) = dist.captures(line) {
            if let Ok(v) = m[1].parse::<f64>() {
                bar.distance_m = Some(if m[2].eq_ignore_ascii_case("ft") {
                    ft_to_m(v)
                } else {
                    v
                });
            }
        }

        if let Some(m) = alt.captures(line) {
            if let Ok(v) = m[1].parse::<f64>() {
                bar.altitude_m = Some(if m[2].eq_ignore_ascii_case("ft") {
                    ft_to_m(v)
                } else {
                    v
                });
            }
        }

        if let Some(m) = speed.captures(line) {
            if let Ok(v) = m[1].parse::<f64>() {
                bar.speed_kmh = Some(if m[2].eq_ignore_ascii_case("mph") {
                    v * 1.609_344
                } else {
                    v
                });
            }
        }

        if let Some(m) = sats.captures(line) {
            bar.satellites = m[1].parse().ok();
        }

        // Voltage only on GPS-free lines — coordinate pairs like
        // "52.2297, 21.0122 V..." would otherwise false-match.
        if let Some(m) = gps.captures(line) {
            bar.gps = match (m[1].parse(), m[2].parse()) {
                (Ok(lat), Ok(lon)) => Some((lat, lon)),
                _ => None,
            };
        } else if let Some(m) = volt.captures(line) {
            bar.voltage_v = m[1].parse().ok();
        }
    }

    bar
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
1
00:00:01,000 --> 00:00:02,000
D: 132m  H: 48ft  15.8 V
02:15  Radio 1: -64 dBm  11 SNR  Radio 2: -71 dBm  42.1 Mbps

2
00:00:02,000 --> 00:00:03,000
No MAVLink telemetry
";

    #[test]
    fn test_field_extraction() {
        let track = parse_srt(SAMPLE).unwrap();
        assert_eq!(track.len(), 2);

        let bar = track.first().unwrap().bar.as_ref().unwrap();
        assert_eq!(bar.distance_m, Some(132.0));
        assert!((bar.altitude_m.unwrap() - 14.63).abs() < 0.01);
        assert_eq!(bar.voltage_v, Some(15.8));
        assert_eq!(bar.flight_time.as_deref(), Some("02:15"));
        assert_eq!(bar.signal_dbm, Some(-64));
        assert_eq!(bar.signal_snr, Some(11));
        assert_eq!(bar.radio2_dbm, Some(-71));
        assert_eq!(bar.link_mbps, Some(42.1));
    }

    #[test]
    fn test_placeholder_lines_yield_empty_bar() {
        let track = parse_srt(SAMPLE).unwrap();
        let bar = track.last().unwrap().bar.as_ref().unwrap();
        assert!(bar.is_empty());
    }

    #[test]
    fn test_entry_timestamps_key_the_track() {
        let track = parse_srt(SAMPLE).unwrap();
        assert_eq!(track.first().unwrap().time_ms, 1000);
        assert_eq!(track.last().unwrap().time_ms, 2000);
        assert!(track.snapshot_at(500).is_none());
        assert_eq!(track.snapshot_at(1500).unwrap().time_ms, 1000);
    }

    #[test]
    fn test_missing_trailing_blank_line() {
        let text = "1\n00:00:00,500 --> 00:00:01,000\nH: 10m";
        let track = parse_srt(text).unwrap();
        assert_eq!(track.len(), 1);
        assert_eq!(track.first().unwrap().time_ms, 500);
        assert_eq!(
            track.first().unwrap().bar.as_ref().unwrap().altitude_m,
            Some(10.0)
        );
    }

    #[test]
    fn test_gps_line_does_not_false_match_voltage() {
        let text = "1\n00:00:00,000 --> 00:00:01,000\n52.2297, 21.0122\n";
        let track = parse_srt(text).unwrap();
        let bar = track.first().unwrap().bar.as_ref().unwrap();
        assert_eq!(bar.gps, Some((52.2297, 21.0122)));
        assert_eq!(bar.voltage_v, None);
    }

    #[test]
    fn test_unknown_labels_ignored() {
        let text = "1\n00:00:00,000 --> 00:00:01,000\nWOBBLE: 3.2qux  H: 5m\n";
        let track = parse_srt(text).unwrap();
        let bar = track.first().unwrap().bar.as_ref().unwrap();
        assert_eq!(bar.altitude_m, Some(5.0));
    }

    #[test]
    fn test_empty_file_is_empty_track() {
        assert!(matches!(
            parse_srt("\n\n").unwrap_err(),
            HudburnError::EmptyTrack
        ));
    }

    #[test]
    fn test_speed_and_sats_labels() {
        let text = "1\n00:00:00,000 --> 00:00:01,000\nSPD: 62 km/h  Sats: 14\n";
        let track = parse_srt(text).unwrap();
        let bar = track.first().unwrap().bar.as_ref().unwrap();
        assert_eq!(bar.speed_kmh, Some(62.0));
        assert_eq!(bar.satellites, Some(14));
    }
}
