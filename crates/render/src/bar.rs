//! Telemetry status bar: a translucent strip near the bottom edge
//! showing the snapshot's numeric fields as one line of text.
//!
//! Text is set with the OSD font's ASCII page, so the bar matches the
//! HUD's look and needs no extra rasterizer.

use std::collections::HashMap;

use hudburn_font::{GlyphBitmap, GlyphBitmapSet};
use hudburn_telemetry::BarData;

use crate::compositor::{blit_over, fill_rect_over, scale_bitmap};

const STRIP_ALPHA: f32 = 0.45;

pub(crate) fn draw_bar(
    canvas: &mut [u8],
    canvas_w: u32,
    canvas_h: u32,
    font: &GlyphBitmapSet,
    scaled: &mut HashMap<(u16, u32, u32), GlyphBitmap>,
    data: &BarData,
    opacity: f32,
) {
    let text = data.status_line();
    if text.is_empty() {
        return;
    }

    // Text height tracks the canvas so the bar reads the same at any
    // resolution; glyph aspect is preserved.
    let glyph_h = (canvas_h / 30).max(8);
    let glyph_w = (glyph_h * font.tile_w() / font.tile_h()).max(1);
    let pad = (glyph_h / 4).max(2);
    let strip_h = glyph_h + 2 * pad;
    let strip_y = canvas_h as i64 - strip_h as i64 - (glyph_h / 2) as i64;

    fill_rect_over(
        canvas,
        canvas_w,
        canvas_h,
        0,
        strip_y,
        canvas_w,
        strip_h,
        [0, 0, 0],
        STRIP_ALPHA * opacity,
    );

    let text_w = text.len() as i64 * glyph_w as i64;
    let mut x = ((canvas_w as i64 - text_w) / 2).max(0);
    let y = strip_y + pad as i64;

    for ch in text.chars() {
        if ch != ' ' {
            let code = ch as u16;
            if let Some(source) = font.get(code) {
                let glyph = scaled
                    .entry((code, glyph_w, glyph_h))
                    .or_insert_with(|| scale_bitmap(source, glyph_w, glyph_h));
                blit_over(canvas, canvas_w, canvas_h, glyph, x, y, opacity);
            }
        }
        x += glyph_w as i64;
    }
}
