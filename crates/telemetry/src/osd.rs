//! Binary `.osd` frame-log parser.
//!
//! File layout:
//!
//! ```text
//! Header (40 bytes):
//!   bytes 0..4   source tag, 4 ASCII bytes ("BTFL", "INAV", "ARDU", ...)
//!   bytes 4..6   u16 LE grid columns   (0 = classic 53)
//!   bytes 6..8   u16 LE grid rows      (0 = classic 20)
//!   byte  8      bytes per cell, 1 or 2 (0 = 2)
//!   byte  9      flags, bit 0 = frame records carry a u32 sequence number
//!   bytes 10..40 zero padding
//!
//! Frame record (fixed size per file):
//!   u32 LE timestamp_ms
//!   [u32 LE sequence]           when flagged in the header
//!   cols × rows cells, LE       complete independent snapshot, no deltas
//! ```
//!
//! Cell code 0 is transparent; 0x20 is an explicit blank. A truncated
//! trailing record is dropped — the track up to that point is still usable.

use hudburn_common::error::{HudburnError, HudburnResult};

use crate::track::{GlyphGrid, TelemetrySnapshot, TelemetryTrack, DEFAULT_GRID_COLS, DEFAULT_GRID_ROWS};

pub const HEADER_SIZE: usize = 40;

const FLAG_SEQUENCE: u8 = 0x01;

/// The 4-byte source tag from a binary telemetry header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceTag(pub [u8; 4]);

impl SourceTag {
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("????")
    }
}

impl std::fmt::Display for SourceTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Post-flight statistics scraped from the first OSD frame.
///
/// Flight controllers show a stats screen when disarming, and recorders
/// start with it on screen, so the first frame usually carries these as
/// plain text rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlightStats {
    pub total_arm_time: Option<String>,
    pub min_battery_v: Option<f64>,
    pub min_rssi_pct: Option<i32>,
    pub max_current_a: Option<f64>,
    pub used_mah: Option<u32>,
}

/// Decoded geometry of one binary file.
#[derive(Debug, Clone, Copy)]
struct FrameLayout {
    cols: u16,
    rows: u16,
    bytes_per_cell: usize,
    has_sequence: bool,
}

impl FrameLayout {
    fn record_size(&self) -> usize {
        4 + if self.has_sequence { 4 } else { 0 }
            + self.cols as usize * self.rows as usize * self.bytes_per_cell
    }
}

/// Parse a binary OSD frame log into a telemetry track.
///
/// Returns the track, the detected source tag (for the source adapter),
/// and stats from the first frame. Fails with `MalformedHeader` when the
/// leading tag is unreadable and `EmptyTrack` when no complete frame
/// records were decoded.
pub fn parse_osd(raw: &[u8]) -> HudburnResult<(TelemetryTrack, SourceTag, FlightStats)> {
    if raw.len() < HEADER_SIZE {
        return Err(HudburnError::malformed_header(format!(
            "file is {} bytes, shorter than the {HEADER_SIZE}-byte header",
            raw.len()
        )));
    }

    let tag_bytes = [raw[0], raw[1], raw[2], raw[3]];
    if !tag_bytes.iter().all(|b| b.is_ascii_alphanumeric()) {
        return Err(HudburnError::malformed_header(format!(
            "source tag bytes {:02x?} are not printable ASCII",
            tag_bytes
        )));
    }
    let tag = SourceTag(tag_bytes);

    let layout = read_layout(raw)?;
    let record_size = layout.record_size();
    let cells_per_frame = layout.cols as usize * layout.rows as usize;

    let mut track = TelemetryTrack::new();
    let mut offset = HEADER_SIZE;

    while raw.len() - offset >= record_size {
        let time_ms = u32::from_le_bytes(raw[offset..offset + 4].try_into().unwrap()) as u64;
        let mut cursor = offset + 4;

        let seq = if layout.has_sequence {
            let s = u32::from_le_bytes(raw[cursor..cursor + 4].try_into().unwrap());
            cursor += 4;
            Some(s)
        } else {
            None
        };

        let mut cells = Vec::with_capacity(cells_per_frame);
        match layout.bytes_per_cell {
            1 => {
                cells.extend(raw[cursor..cursor + cells_per_frame].iter().map(|&b| b as u16));
            }
            _ => {
                for i in 0..cells_per_frame {
                    let at = cursor + i * 2;
                    cells.push(u16::from_le_bytes(raw[at..at + 2].try_into().unwrap()));
                }
            }
        }

        let grid = GlyphGrid::from_cells(layout.cols, layout.rows, cells)
            .ok_or_else(|| HudburnError::parse("glyph buffer does not match grid geometry"))?;

        track.push(TelemetrySnapshot {
            time_ms,
            seq,
            grid: Some(grid),
            bar: None,
        });
        offset += record_size;
    }

    let trailing = raw.len() - offset;
    if trailing > 0 {
        tracing::warn!(
            trailing_bytes = trailing,
            record_size,
            "Dropping truncated trailing OSD record"
        );
    }

    if track.is_empty() {
        return Err(HudburnError::EmptyTrack);
    }

    let stats = track
        .first()
        .and_then(|s| s.grid.as_ref())
        .map(extract_stats)
        .unwrap_or_default();

    tracing::info!(
        tag = %tag,
        frames = track.len(),
        duration_ms = track.duration_ms(),
        cols = layout.cols,
        rows = layout.rows,
        "Parsed OSD frame log"
    );

    Ok((track, tag, stats))
}

fn read_layout(raw: &[u8]) -> HudburnResult<FrameLayout> {
    let cols = u16::from_le_bytes([raw[4], raw[5]]);
    let rows = u16::from_le_bytes([raw[6], raw[7]]);
    let bpc = raw[8];
    let flags = raw[9];

    // Classic recorders leave the geometry fields zeroed.
    let (cols, rows) = if cols == 0 || rows == 0 {
        (DEFAULT_GRID_COLS, DEFAULT_GRID_ROWS)
    } else {
        (cols, rows)
    };

    let bytes_per_cell = match bpc {
        0 | 2 => 2,
        1 => 1,
        other => {
            return Err(HudburnError::malformed_header(format!(
                "unsupported bytes-per-cell value {other}"
            )))
        }
    };

    if cols > 128 || rows > 64 {
        return Err(HudburnError::malformed_header(format!(
            "implausible grid geometry {cols}x{rows}"
        )));
    }

    Ok(FrameLayout {
        cols,
        rows,
        bytes_per_cell,
        has_sequence: flags & FLAG_SEQUENCE != 0,
    })
}

// ── Stats-screen scraping ────────────────────────────────────────────────

fn extract_stats(grid: &GlyphGrid) -> FlightStats {
    let mut stats = FlightStats::default();

    for row in 0..grid.rows() {
        let line = row_text(grid, row);
        if (line.contains("TOTAL") && line.contains("ARM"))
            || (line.contains("FLY") && line.contains("TIME"))
            || (line.contains("FLIGHT") && line.contains("TIME"))
        {
            let v = after_colon(&line);
            if !v.is_empty() {
                stats.total_arm_time = Some(v);
            }
        } else if line.contains("MIN") && line.contains("BATTERY") {
            stats.min_battery_v = first_number(&after_colon(&line));
        } else if line.contains("MIN") && line.contains("RSSI") {
            stats.min_rssi_pct =
                first_number(&after_colon(&line).replace('%', "")).map(|v| v as i32);
        } else if line.contains("CURRENT") && !line.contains("MIN") {
            stats.max_current_a = first_number(&after_colon(&line));
        } else if line.contains("USED") && (line.contains("MAH") || line.contains("CAPACITY")) {
            stats.used_mah = first_number(&after_colon(&line)).map(|v| v as u32);
        }
    }

    stats
}

fn row_text(grid: &GlyphGrid, row: u16) -> String {
    (0..grid.cols())
        .map(|col| {
            let code = grid.code_at(row, col);
            if (0x20..0x7f).contains(&code) {
                code as u8 as char
            } else {
                ' '
            }
        })
        .collect()
}

fn after_colon(line: &str) -> String {
    match line.find(':') {
        Some(idx) => line[idx + 1..].trim().to_string(),
        None => String::new(),
    }
}

fn first_number(text: &str) -> Option<f64> {
    text.split_whitespace()
        .next()
        .and_then(|word| word.trim_end_matches(|c: char| c.is_ascii_alphabetic()).parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn build_osd_file(
        tag: &[u8; 4],
        cols: u16,
        rows: u16,
        frames: &[(u32, u16)],
    ) -> Vec<u8> {
        let mut raw = vec![0u8; HEADER_SIZE];
        raw[..4].copy_from_slice(tag);
        raw[4..6].copy_from_slice(&cols.to_le_bytes());
        raw[6..8].copy_from_slice(&rows.to_le_bytes());
        raw[8] = 2;
        for &(ts, fill) in frames {
            raw.extend_from_slice(&ts.to_le_bytes());
            for _ in 0..cols as usize * rows as usize {
                raw.extend_from_slice(&fill.to_le_bytes());
            }
        }
        raw
    }

    #[test]
    fn test_btfl_two_frame_scenario() {
        let raw = build_osd_file(b"BTFL", 30, 15, &[(1000, 0x41), (2000, 0x42)]);
        let (track, tag, _) = parse_osd(&raw).unwrap();

        assert_eq!(tag.as_str(), "BTFL");
        assert_eq!(track.len(), 2);
        assert_eq!(track.snapshot_at(1500).unwrap().time_ms, 1000);
        assert_eq!(track.snapshot_at(2500).unwrap().time_ms, 2000);
        assert!(track.snapshot_at(500).is_none());
    }

    #[test]
    fn test_parse_is_deterministic() {
        let raw = build_osd_file(b"INAV", 10, 4, &[(5, 1), (10, 2), (15, 3)]);
        let (a, _, _) = parse_osd(&raw).unwrap();
        let (b, _, _) = parse_osd(&raw).unwrap();
        let ta: Vec<u64> = a.iter().map(|s| s.time_ms).collect();
        let tb: Vec<u64> = b.iter().map(|s| s.time_ms).collect();
        assert_eq!(ta, tb);
    }

    #[test]
    fn test_truncated_trailing_record_dropped() {
        let mut raw = build_osd_file(b"ARDU", 8, 4, &[(100, 7), (200, 8)]);
        raw.truncate(raw.len() - 10);
        let (track, _, _) = parse_osd(&raw).unwrap();
        assert_eq!(track.len(), 1);
        assert_eq!(track.last().unwrap().time_ms, 100);
    }

    #[test]
    fn test_malformed_header_rejected() {
        let err = parse_osd(&[0u8; 10]).unwrap_err();
        assert!(matches!(err, HudburnError::MalformedHeader { .. }));

        let mut raw = vec![0u8; HEADER_SIZE];
        raw[..4].copy_from_slice(&[0x00, 0xff, 0x01, 0x02]);
        let err = parse_osd(&raw).unwrap_err();
        assert!(matches!(err, HudburnError::MalformedHeader { .. }));
    }

    #[test]
    fn test_zero_frames_is_empty_track() {
        let raw = build_osd_file(b"BTFL", 4, 2, &[]);
        let err = parse_osd(&raw).unwrap_err();
        assert!(matches!(err, HudburnError::EmptyTrack));
    }

    #[test]
    fn test_zeroed_geometry_uses_classic_layout() {
        let mut raw = vec![0u8; HEADER_SIZE];
        raw[..4].copy_from_slice(b"BTFL");
        let cells = DEFAULT_GRID_COLS as usize * DEFAULT_GRID_ROWS as usize;
        raw.extend_from_slice(&42u32.to_le_bytes());
        raw.extend(std::iter::repeat(0u8).take(cells * 2));

        let (track, _, _) = parse_osd(&raw).unwrap();
        let grid = track.first().unwrap().grid.as_ref().unwrap();
        assert_eq!(grid.cols(), DEFAULT_GRID_COLS);
        assert_eq!(grid.rows(), DEFAULT_GRID_ROWS);
    }

    #[test]
    fn test_sequence_flag_parsed() {
        let cols = 4u16;
        let rows = 2u16;
        let mut raw = vec![0u8; HEADER_SIZE];
        raw[..4].copy_from_slice(b"BTFL");
        raw[4..6].copy_from_slice(&cols.to_le_bytes());
        raw[6..8].copy_from_slice(&rows.to_le_bytes());
        raw[8] = 2;
        raw[9] = FLAG_SEQUENCE;
        raw.extend_from_slice(&100u32.to_le_bytes());
        raw.extend_from_slice(&9u32.to_le_bytes());
        raw.extend(std::iter::repeat(0u8).take(cols as usize * rows as usize * 2));

        let (track, _, _) = parse_osd(&raw).unwrap();
        assert_eq!(track.first().unwrap().seq, Some(9));
    }

    #[test]
    fn test_stats_screen_extraction() {
        let cols = 30u16;
        let rows = 4u16;
        let mut cells = vec![0u16; cols as usize * rows as usize];
        let write_row = |cells: &mut Vec<u16>, row: usize, text: &str| {
            for (i, ch) in text.chars().enumerate() {
                cells[row * cols as usize + i] = ch as u16;
            }
        };
        write_row(&mut cells, 0, "TOTAL ARM : 05:12");
        write_row(&mut cells, 1, "MIN BATTERY : 14.2 V");
        write_row(&mut cells, 2, "MIN RSSI : 61%");
        write_row(&mut cells, 3, "USED MAH : 1204");

        let grid = GlyphGrid::from_cells(cols, rows, cells).unwrap();
        let stats = extract_stats(&grid);
        assert_eq!(stats.total_arm_time.as_deref(), Some("05:12"));
        assert_eq!(stats.min_battery_v, Some(14.2));
        assert_eq!(stats.min_rssi_pct, Some(61));
        assert_eq!(stats.used_mah, Some(1204));
    }
}
