//! Hudburn Telemetry
//!
//! Decodes flight-controller telemetry recordings into an ordered,
//! timestamp-indexed track that the render pipeline samples once per
//! output video frame.
//!
//! Two on-disk formats are supported:
//! - binary `.osd` frame logs: a tagged header followed by fixed-size
//!   glyph-grid snapshots ([`osd`])
//! - `.srt` subtitle telemetry: timestamped free-text entries with
//!   labelled numeric fields ([`srt`])
//!
//! Decoded tracks pass through the source adapter ([`profile`]) which
//! normalizes firmware-specific glyph codes into one canonical shape.

pub mod osd;
pub mod profile;
pub mod srt;
pub mod track;

pub use osd::{parse_osd, FlightStats, SourceTag};
pub use profile::{normalize, SourceProfile};
pub use srt::parse_srt;
pub use track::{BarData, GlyphGrid, TelemetrySnapshot, TelemetryTrack};
