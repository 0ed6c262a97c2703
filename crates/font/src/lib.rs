//! Hudburn Font
//!
//! Loads OSD bitmap font sheets and exposes glyph bitmaps by character
//! code. A sheet is a tall PNG of 256 glyph rows; wide sheets pack
//! multiple 256-glyph pages side by side (Betaflight sheets carry four).
//! The whole set is extracted once per render job and shared read-only
//! with the compositor.

pub mod sheet;

pub use sheet::{load_bitmaps, FontVariant, GlyphBitmap, GlyphBitmapSet};
