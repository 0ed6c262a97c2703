use proptest::prelude::*;

use hudburn_telemetry::osd::{parse_osd, HEADER_SIZE};
use hudburn_telemetry::track::{TelemetrySnapshot, TelemetryTrack};

fn build_osd_file(tag: &[u8; 4], cols: u16, rows: u16, timestamps: &[u32]) -> Vec<u8> {
    let mut raw = vec![0u8; HEADER_SIZE];
    raw[..4].copy_from_slice(tag);
    raw[4..6].copy_from_slice(&cols.to_le_bytes());
    raw[6..8].copy_from_slice(&rows.to_le_bytes());
    raw[8] = 2;
    for &ts in timestamps {
        raw.extend_from_slice(&ts.to_le_bytes());
        raw.extend(std::iter::repeat(0u8).take(cols as usize * rows as usize * 2));
    }
    raw
}

fn track_from(timestamps: &[u64]) -> TelemetryTrack {
    let mut track = TelemetryTrack::new();
    for &time_ms in timestamps {
        track.push(TelemetrySnapshot {
            time_ms,
            seq: None,
            grid: None,
            bar: None,
        });
    }
    track
}

proptest! {
    #[test]
    fn parsed_track_timestamps_strictly_increase(
        timestamps in proptest::collection::vec(0u32..10_000_000, 1..64)
    ) {
        let raw = build_osd_file(b"BTFL", 8, 4, &timestamps);
        let Ok((track, _, _)) = parse_osd(&raw) else {
            // All-duplicate/backwards inputs can collapse to one frame but
            // never to zero, so parse_osd must have succeeded.
            panic!("parse failed on well-formed input");
        };

        let decoded: Vec<u64> = track.iter().map(|s| s.time_ms).collect();
        prop_assert!(decoded.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn parsing_is_deterministic(
        timestamps in proptest::collection::vec(0u32..1_000_000, 1..32)
    ) {
        let raw = build_osd_file(b"INAV", 4, 4, &timestamps);
        let a = parse_osd(&raw).unwrap();
        let b = parse_osd(&raw).unwrap();
        let ta: Vec<u64> = a.0.iter().map(|s| s.time_ms).collect();
        let tb: Vec<u64> = b.0.iter().map(|s| s.time_ms).collect();
        prop_assert_eq!(ta, tb);
    }

    #[test]
    fn resolver_returns_floor_snapshot(
        mut timestamps in proptest::collection::vec(0u64..1_000_000, 2..64),
        query in 0u64..1_100_000
    ) {
        timestamps.sort_unstable();
        timestamps.dedup();
        let track = track_from(&timestamps);

        match track.snapshot_at(query) {
            None => prop_assert!(query < timestamps[0]),
            Some(snapshot) => {
                // Greatest timestamp <= query, by linear reference scan.
                let expected = timestamps
                    .iter()
                    .copied()
                    .filter(|&t| t <= query)
                    .max()
                    .unwrap();
                prop_assert_eq!(snapshot.time_ms, expected);
            }
        }
    }
}
