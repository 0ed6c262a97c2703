//! Telemetry snapshots, tracks, and timestamp resolution.

/// Grid dimensions of the classic MSP OSD recording layout. Binary files
/// whose header omits geometry fall back to these.
pub const DEFAULT_GRID_COLS: u16 = 53;
pub const DEFAULT_GRID_ROWS: u16 = 20;

/// A fixed-size 2D grid of glyph codes representing the HUD at one instant.
///
/// Code 0 means a transparent cell; everything else is drawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlyphGrid {
    cols: u16,
    rows: u16,
    cells: Vec<u16>,
}

impl GlyphGrid {
    /// Build a grid from a flat row-major cell buffer.
    ///
    /// Returns `None` when the buffer length does not match the geometry.
    pub fn from_cells(cols: u16, rows: u16, cells: Vec<u16>) -> Option<Self> {
        if cells.len() != cols as usize * rows as usize {
            return None;
        }
        Some(Self { cols, rows, cells })
    }

    pub fn cols(&self) -> u16 {
        self.cols
    }

    pub fn rows(&self) -> u16 {
        self.rows
    }

    pub fn code_at(&self, row: u16, col: u16) -> u16 {
        self.cells[row as usize * self.cols as usize + col as usize]
    }

    /// Iterate `(row, col, code)` over all visible (non-zero) cells.
    pub fn occupied(&self) -> impl Iterator<Item = (u16, u16, u16)> + '_ {
        let cols = self.cols as usize;
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, &code)| code != 0)
            .map(move |(i, &code)| ((i / cols) as u16, (i % cols) as u16, code))
    }

    /// Map every cell through `f`, producing a new grid.
    pub fn map_codes(&self, f: impl Fn(u16) -> u16) -> Self {
        Self {
            cols: self.cols,
            rows: self.rows,
            cells: self.cells.iter().map(|&c| f(c)).collect(),
        }
    }
}

/// Numeric telemetry fields rendered as the status bar below the glyph grid.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BarData {
    /// Flight time as "MM:SS".
    pub flight_time: Option<String>,
    pub speed_kmh: Option<f64>,
    pub altitude_m: Option<f64>,
    pub distance_m: Option<f64>,
    pub satellites: Option<u32>,
    /// Primary radio signal strength.
    pub signal_dbm: Option<i32>,
    pub signal_snr: Option<i32>,
    /// Secondary radio, when the link has two interfaces.
    pub radio2_dbm: Option<i32>,
    pub radio2_snr: Option<i32>,
    pub link_mbps: Option<f64>,
    pub voltage_v: Option<f64>,
    pub gps: Option<(f64, f64)>,
}

impl BarData {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Compact one-line status string for the overlay bar.
    pub fn status_line(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        if let Some(t) = &self.flight_time {
            parts.push(t.clone());
        }
        if let Some(dbm) = self.signal_dbm {
            let mut s = format!("R1:{dbm:+}DBM");
            if let Some(snr) = self.signal_snr {
                s.push_str(&format!(" {snr}SNR"));
            }
            parts.push(s);
        }
        if let Some(dbm) = self.radio2_dbm {
            let mut s = format!("R2:{dbm:+}DBM");
            if let Some(snr) = self.radio2_snr {
                s.push_str(&format!(" {snr}SNR"));
            }
            parts.push(s);
        }
        if let Some(mbps) = self.link_mbps {
            parts.push(format!("{mbps:.1}MBPS"));
        }
        if let Some(v) = self.voltage_v {
            parts.push(format!("{v:.1}V"));
        }
        if let Some(s) = self.speed_kmh {
            parts.push(format!("S:{s:.0}KM/H"));
        }
        if let Some(h) = self.altitude_m {
            parts.push(format!("H:{h:.0}M"));
        }
        if let Some(d) = self.distance_m {
            parts.push(format!("D:{d:.0}M"));
        }
        if let Some(n) = self.satellites {
            parts.push(format!("SAT:{n}"));
        }
        parts.join("  ")
    }
}

/// One instant's decoded telemetry state. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetrySnapshot {
    /// Milliseconds since the recorder started. Track key.
    pub time_ms: u64,

    /// Recorder sequence number, when the format carries one.
    pub seq: Option<u32>,

    /// HUD glyph grid (binary OSD sources).
    pub grid: Option<GlyphGrid>,

    /// Status bar fields (SRT sources, or merged in).
    pub bar: Option<BarData>,
}

/// The full ordered telemetry timeline for one recording.
///
/// Timestamps are strictly increasing after ingestion: a later snapshot
/// with a duplicate timestamp overwrites the earlier one, and a snapshot
/// that steps backwards is dropped with a warning.
#[derive(Debug, Clone, Default)]
pub struct TelemetryTrack {
    snapshots: Vec<TelemetrySnapshot>,
}

impl TelemetryTrack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingest one snapshot, maintaining the strictly-increasing invariant.
    pub fn push(&mut self, snapshot: TelemetrySnapshot) {
        match self.snapshots.last() {
            Some(last) if snapshot.time_ms == last.time_ms => {
                *self.snapshots.last_mut().unwrap() = snapshot;
            }
            Some(last) if snapshot.time_ms < last.time_ms => {
                tracing::warn!(
                    time_ms = snapshot.time_ms,
                    last_ms = last.time_ms,
                    "Dropping out-of-order telemetry snapshot"
                );
            }
            _ => self.snapshots.push(snapshot),
        }
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TelemetrySnapshot> {
        self.snapshots.iter()
    }

    pub fn first(&self) -> Option<&TelemetrySnapshot> {
        self.snapshots.first()
    }

    pub fn last(&self) -> Option<&TelemetrySnapshot> {
        self.snapshots.last()
    }

    /// Timestamp of the final snapshot, or 0 for an empty track.
    pub fn duration_ms(&self) -> u64 {
        self.snapshots.last().map(|s| s.time_ms).unwrap_or(0)
    }

    /// Most recent snapshot at or before `query_ms`.
    ///
    /// `None` means "no telemetry yet" — the query precedes the first
    /// snapshot. Queries past the end return the last snapshot, freezing
    /// the HUD over any trailing video. O(log n).
    pub fn snapshot_at(&self, query_ms: u64) -> Option<&TelemetrySnapshot> {
        let idx = self.snapshots.partition_point(|s| s.time_ms <= query_ms);
        if idx == 0 {
            return None;
        }
        Some(&self.snapshots[idx - 1])
    }

    /// Whether any snapshot falls inside `[start_ms, end_ms]`.
    pub fn overlaps_window(&self, start_ms: u64, end_ms: u64) -> bool {
        self.snapshots
            .iter()
            .any(|s| s.time_ms >= start_ms && s.time_ms <= end_ms)
    }

    /// Rebuild the track by mapping every snapshot. Used by the source
    /// adapter; ordering is preserved because timestamps are untouched.
    pub(crate) fn map_snapshots(
        self,
        f: impl Fn(TelemetrySnapshot) -> TelemetrySnapshot,
    ) -> Self {
        Self {
            snapshots: self.snapshots.into_iter().map(f).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(time_ms: u64) -> TelemetrySnapshot {
        TelemetrySnapshot {
            time_ms,
            seq: None,
            grid: None,
            bar: None,
        }
    }

    #[test]
    fn test_resolve_before_first_is_sentinel() {
        let mut track = TelemetryTrack::new();
        track.push(snap(1000));
        track.push(snap(2000));
        assert!(track.snapshot_at(500).is_none());
        assert!(track.snapshot_at(999).is_none());
    }

    #[test]
    fn test_resolve_between_and_past_end() {
        let mut track = TelemetryTrack::new();
        track.push(snap(1000));
        track.push(snap(2000));
        assert_eq!(track.snapshot_at(1000).unwrap().time_ms, 1000);
        assert_eq!(track.snapshot_at(1500).unwrap().time_ms, 1000);
        assert_eq!(track.snapshot_at(2000).unwrap().time_ms, 2000);
        assert_eq!(track.snapshot_at(2500).unwrap().time_ms, 2000);
    }

    #[test]
    fn test_duplicate_timestamp_overwrites() {
        let mut track = TelemetryTrack::new();
        track.push(snap(1000));
        track.push(TelemetrySnapshot {
            seq: Some(7),
            ..snap(1000)
        });
        assert_eq!(track.len(), 1);
        assert_eq!(track.first().unwrap().seq, Some(7));
    }

    #[test]
    fn test_out_of_order_snapshot_dropped() {
        let mut track = TelemetryTrack::new();
        track.push(snap(2000));
        track.push(snap(1000));
        assert_eq!(track.len(), 1);
        assert_eq!(track.first().unwrap().time_ms, 2000);
    }

    #[test]
    fn test_grid_occupied_skips_transparent_cells() {
        let grid = GlyphGrid::from_cells(3, 2, vec![0, 5, 0, 0, 0, 9]).unwrap();
        let cells: Vec<_> = grid.occupied().collect();
        assert_eq!(cells, vec![(0, 1, 5), (1, 2, 9)]);
    }

    #[test]
    fn test_status_line_ordering() {
        let bar = BarData {
            flight_time: Some("02:15".to_string()),
            signal_dbm: Some(-64),
            signal_snr: Some(11),
            voltage_v: Some(15.3),
            altitude_m: Some(42.0),
            ..Default::default()
        };
        assert_eq!(bar.status_line(), "02:15  R1:-64DBM 11SNR  15.3V  H:42M");
    }
}
