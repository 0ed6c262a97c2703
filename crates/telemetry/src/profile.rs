//! Source profiles: firmware/camera-specific decoding rules.
//!
//! The binary header's 4-byte tag selects how raw glyph codes map onto the
//! canonical grid: which font family the codes index, how many 256-glyph
//! pages that family has, and which codes mean "blank". Tags form a closed
//! set; anything unrecognised falls back to the most common profile
//! (Betaflight) and the caller is told via the `used_fallback` flag so it
//! can warn the user instead of hard-failing on exotic recorders.

use crate::osd::SourceTag;
use crate::track::TelemetryTrack;

/// Decoding profile for one telemetry source family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceProfile {
    pub name: &'static str,
    pub tag: &'static str,
    /// Font folder name prefixes this family's sheets ship under.
    pub font_prefixes: &'static [&'static str],
    /// 256-glyph pages the family's fonts carry (Betaflight sheets have 4).
    pub glyph_pages: u16,
    /// Raw codes folded to transparent (0x20 is an explicit space).
    pub blank_codes: &'static [u16],
}

const BETAFLIGHT: SourceProfile = SourceProfile {
    name: "Betaflight",
    tag: "BTFL",
    font_prefixes: &["BTFL_", "BFX4_"],
    glyph_pages: 4,
    blank_codes: &[0x20],
};

const INAV: SourceProfile = SourceProfile {
    name: "INAV",
    tag: "INAV",
    font_prefixes: &["INAV"],
    glyph_pages: 1,
    blank_codes: &[0x20],
};

const ARDUPILOT: SourceProfile = SourceProfile {
    name: "ArduPilot",
    tag: "ARDU",
    font_prefixes: &["ARDU_"],
    glyph_pages: 1,
    blank_codes: &[0x20],
};

const PITLAB: SourceProfile = SourceProfile {
    name: "PitLab",
    tag: "PITL",
    font_prefixes: &["PITL_"],
    glyph_pages: 1,
    blank_codes: &[0x20],
};

/// Goggle-side DVR with the OSD stream muxed in by the video unit.
const GOGGLE_DVR: SourceProfile = SourceProfile {
    name: "Goggle DVR",
    tag: "DJIG",
    font_prefixes: &["BTFL_DJI", "DJI_"],
    glyph_pages: 2,
    blank_codes: &[0x20],
};

/// Air-unit-side recording; same grid, single font page.
const AIR_UNIT: SourceProfile = SourceProfile {
    name: "Air Unit",
    tag: "WSNL",
    font_prefixes: &["WSNL_", "AVTR_"],
    glyph_pages: 1,
    blank_codes: &[0x20],
};

const PROFILES: &[SourceProfile] = &[BETAFLIGHT, INAV, ARDUPILOT, PITLAB, GOGGLE_DVR, AIR_UNIT];

impl SourceProfile {
    /// Look up the profile for a detected tag.
    ///
    /// Unknown tags return the Betaflight profile with `used_fallback =
    /// true`; the data still renders, possibly with some misassigned
    /// glyphs, and the caller surfaces the flag as a warning.
    pub fn for_tag(tag: &SourceTag) -> (Self, bool) {
        let tag_str = tag.as_str();
        match PROFILES.iter().find(|p| p.tag == tag_str) {
            Some(profile) => (*profile, false),
            None => {
                tracing::warn!(
                    tag = tag_str,
                    fallback = BETAFLIGHT.name,
                    "Unknown telemetry source tag, using fallback profile"
                );
                (BETAFLIGHT, true)
            }
        }
    }

    pub fn all() -> &'static [SourceProfile] {
        PROFILES
    }

    /// Map a raw cell value onto this family's glyph space.
    ///
    /// Codes past the family's last page index the wrong sheet column on
    /// lookup, so they wrap onto page 0; explicit blanks fold to 0.
    pub fn canonical_code(&self, raw: u16) -> u16 {
        let max = self.glyph_pages * 256;
        let code = if raw >= max { raw % 256 } else { raw };
        if self.blank_codes.contains(&code) {
            0
        } else {
            code
        }
    }
}

/// Normalize a decoded track through the profile selected by `tag`.
///
/// Returns the canonical track and whether the fallback profile was used.
pub fn normalize(track: TelemetryTrack, tag: &SourceTag) -> (TelemetryTrack, SourceProfile, bool) {
    let (profile, used_fallback) = SourceProfile::for_tag(tag);

    let normalized = track.map_snapshots(|mut snapshot| {
        if let Some(grid) = snapshot.grid.take() {
            snapshot.grid = Some(grid.map_codes(|c| profile.canonical_code(c)));
        }
        snapshot
    });

    (normalized, profile, used_fallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::{GlyphGrid, TelemetrySnapshot};

    fn track_with_codes(codes: Vec<u16>) -> TelemetryTrack {
        let mut track = TelemetryTrack::new();
        let len = codes.len() as u16;
        track.push(TelemetrySnapshot {
            time_ms: 100,
            seq: None,
            grid: GlyphGrid::from_cells(len, 1, codes),
            bar: None,
        });
        track
    }

    #[test]
    fn test_known_tags_select_their_profile() {
        for profile in SourceProfile::all() {
            let tag = SourceTag(profile.tag.as_bytes().try_into().unwrap());
            let (selected, used_fallback) = SourceProfile::for_tag(&tag);
            assert_eq!(selected.name, profile.name);
            assert!(!used_fallback);
        }

        // Every flight-controller family the recorder emits is covered.
        for tag in [b"BTFL", b"INAV", b"PITL", b"ARDU"] {
            let (_, used_fallback) = SourceProfile::for_tag(&SourceTag(*tag));
            assert!(!used_fallback, "no fallback expected for {tag:?}");
        }
    }

    #[test]
    fn test_pitlab_decodes_single_page() {
        let (track, profile, used_fallback) =
            normalize(track_with_codes(vec![0x20, 256 + 7]), &SourceTag(*b"PITL"));
        assert!(!used_fallback);
        assert_eq!(profile.name, "PitLab");
        let grid = track.first().unwrap().grid.as_ref().unwrap();
        assert_eq!(grid.code_at(0, 0), 0);
        assert_eq!(grid.code_at(0, 1), 7);
    }

    #[test]
    fn test_unknown_tag_uses_fallback_not_failure() {
        let (track, profile, used_fallback) =
            normalize(track_with_codes(vec![0x41]), &SourceTag(*b"XXXX"));
        assert!(used_fallback);
        assert_eq!(profile.name, "Betaflight");
        assert_eq!(track.len(), 1);
    }

    #[test]
    fn test_blank_codes_fold_to_transparent() {
        let (track, _, _) = normalize(track_with_codes(vec![0x20, 0x41]), &SourceTag(*b"INAV"));
        let grid = track.first().unwrap().grid.as_ref().unwrap();
        assert_eq!(grid.code_at(0, 0), 0);
        assert_eq!(grid.code_at(0, 1), 0x41);
    }

    #[test]
    fn test_out_of_page_codes_wrap() {
        // INAV fonts carry one page; a Betaflight-paged code wraps onto it.
        let (track, _, _) = normalize(track_with_codes(vec![256 + 7]), &SourceTag(*b"INAV"));
        let grid = track.first().unwrap().grid.as_ref().unwrap();
        assert_eq!(grid.code_at(0, 0), 7);

        // Betaflight keeps all four pages addressable.
        let (track, _, _) = normalize(track_with_codes(vec![256 + 7]), &SourceTag(*b"BTFL"));
        let grid = track.first().unwrap().grid.as_ref().unwrap();
        assert_eq!(grid.code_at(0, 0), 256 + 7);
    }
}
