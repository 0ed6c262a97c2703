//! Glyph-grid compositing into a reusable RGBA canvas.

use std::collections::HashMap;
use std::sync::Arc;

use image::imageops::FilterType;
use image::RgbaImage;

use hudburn_font::{GlyphBitmap, GlyphBitmapSet};
use hudburn_telemetry::TelemetrySnapshot;

use crate::bar;

/// Everything that determines the pixels of one overlay frame.
#[derive(Debug, Clone)]
pub struct FrameRenderRequest {
    /// Telemetry-timeline instant this frame shows.
    pub time_ms: u64,
    /// Output canvas dimensions; must match the video stream.
    pub width: u32,
    pub height: u32,
    /// Overall overlay opacity in `[0, 1]`. 0 yields a fully
    /// transparent frame.
    pub opacity: f32,
    /// User nudge of the grid, output pixels.
    pub offset_x: i32,
    pub offset_y: i32,
    /// Multiplier on top of the auto-fit grid scale.
    pub scale: f32,
    pub show_bar: bool,
}

impl FrameRenderRequest {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            time_ms: 0,
            width,
            height,
            opacity: 1.0,
            offset_x: 0,
            offset_y: 0,
            scale: 1.0,
            show_bar: true,
        }
    }
}

/// Renders snapshots into RGBA overlay frames.
///
/// One compositor serves one job: the canvas is allocated once and the
/// scaled-glyph cache fills lazily on first use of each code, then every
/// subsequent frame is pure pixel writes.
pub struct Compositor {
    font: Arc<GlyphBitmapSet>,
    canvas: Vec<u8>,
    width: u32,
    height: u32,
    scaled: HashMap<(u16, u32, u32), GlyphBitmap>,
}

impl Compositor {
    pub fn new(font: Arc<GlyphBitmapSet>, width: u32, height: u32) -> Self {
        Self {
            font,
            canvas: vec![0u8; width as usize * height as usize * 4],
            width,
            height,
            scaled: HashMap::new(),
        }
    }

    /// Composite one frame and return the RGBA bytes.
    ///
    /// `None` means "no telemetry yet" and produces a fully transparent
    /// frame. Rendering never fails: missing glyphs are blank cells and
    /// glyphs crossing the canvas edge are clipped.
    pub fn render(
        &mut self,
        snapshot: Option<&TelemetrySnapshot>,
        request: &FrameRenderRequest,
    ) -> &[u8] {
        self.ensure_canvas(request.width, request.height);
        self.canvas.fill(0);

        let opacity = request.opacity.clamp(0.0, 1.0);
        let Some(snapshot) = snapshot else {
            return &self.canvas;
        };
        if opacity == 0.0 {
            return &self.canvas;
        }

        if let Some(grid) = &snapshot.grid {
            self.draw_grid(grid, request, opacity);
        }

        if request.show_bar {
            if let Some(data) = snapshot.bar.as_ref().filter(|b| !b.is_empty()) {
                bar::draw_bar(
                    &mut self.canvas,
                    self.width,
                    self.height,
                    &self.font,
                    &mut self.scaled,
                    data,
                    opacity,
                );
            }
        }

        &self.canvas
    }

    pub fn frame_len(&self) -> usize {
        self.canvas.len()
    }

    fn ensure_canvas(&mut self, width: u32, height: u32) {
        if width != self.width || height != self.height {
            tracing::trace!(width, height, "Reallocating overlay canvas");
            self.width = width;
            self.height = height;
            self.canvas = vec![0u8; width as usize * height as usize * 4];
        }
    }

    fn draw_grid(
        &mut self,
        grid: &hudburn_telemetry::GlyphGrid,
        request: &FrameRenderRequest,
        opacity: f32,
    ) {
        let rows = grid.rows().max(1) as f32;
        let cols = grid.cols().max(1) as i64;
        let tile_w = self.font.tile_w() as f32;
        let tile_h = self.font.tile_h() as f32;

        // Auto-fit: the grid spans the full canvas height at scale 1.0.
        let eff = (self.height as f32 / (rows * tile_h)) * request.scale;
        if eff <= 0.0 {
            return;
        }
        let cell_w = (tile_w * eff).round().max(1.0) as u32;
        let cell_h = (tile_h * eff).round().max(1.0) as u32;

        let grid_w = cell_w as i64 * cols;
        let grid_h = cell_h as i64 * grid.rows().max(1) as i64;
        let x0 = (self.width as i64 - grid_w) / 2 + request.offset_x as i64;
        let y0 = (self.height as i64 - grid_h) / 2 + request.offset_y as i64;

        for (row, col, code) in grid.occupied() {
            let Some(source) = self.font.get(code) else {
                continue;
            };
            let glyph = self
                .scaled
                .entry((code, cell_w, cell_h))
                .or_insert_with(|| scale_bitmap(source, cell_w, cell_h));
            blit_over(
                &mut self.canvas,
                self.width,
                self.height,
                glyph,
                x0 + col as i64 * cell_w as i64,
                y0 + row as i64 * cell_h as i64,
                opacity,
            );
        }
    }
}

/// Resample a glyph bitmap to the target cell size.
pub(crate) fn scale_bitmap(src: &GlyphBitmap, width: u32, height: u32) -> GlyphBitmap {
    if src.width == width && src.height == height {
        return src.clone();
    }
    let Some(img) = RgbaImage::from_raw(src.width, src.height, src.rgba.clone()) else {
        return GlyphBitmap {
            width,
            height,
            rgba: vec![0u8; width as usize * height as usize * 4],
        };
    };
    let resized = image::imageops::resize(&img, width, height, FilterType::Triangle);
    GlyphBitmap {
        width,
        height,
        rgba: resized.into_raw(),
    }
}

/// Porter-Duff "over" blit of a glyph onto the canvas, clipped at the
/// canvas edges. `opacity` multiplies into the source alpha.
pub(crate) fn blit_over(
    canvas: &mut [u8],
    canvas_w: u32,
    canvas_h: u32,
    glyph: &GlyphBitmap,
    origin_x: i64,
    origin_y: i64,
    opacity: f32,
) {
    for gy in 0..glyph.height {
        let cy = origin_y + gy as i64;
        if cy < 0 || cy >= canvas_h as i64 {
            continue;
        }
        let src_row = (gy * glyph.width * 4) as usize;
        let dst_row = cy as usize * canvas_w as usize * 4;
        for gx in 0..glyph.width {
            let cx = origin_x + gx as i64;
            if cx < 0 || cx >= canvas_w as i64 {
                continue;
            }
            let si = src_row + gx as usize * 4;
            let sa = glyph.rgba[si + 3] as f32 / 255.0 * opacity;
            if sa <= 0.0 {
                continue;
            }
            let di = dst_row + cx as usize * 4;
            blend_pixel(&mut canvas[di..di + 4], &glyph.rgba[si..si + 3], sa);
        }
    }
}

/// Blend a solid-color rectangle onto the canvas, clipped.
pub(crate) fn fill_rect_over(
    canvas: &mut [u8],
    canvas_w: u32,
    canvas_h: u32,
    x: i64,
    y: i64,
    w: u32,
    h: u32,
    rgb: [u8; 3],
    alpha: f32,
) {
    if alpha <= 0.0 {
        return;
    }
    for ry in 0..h {
        let cy = y + ry as i64;
        if cy < 0 || cy >= canvas_h as i64 {
            continue;
        }
        let dst_row = cy as usize * canvas_w as usize * 4;
        for rx in 0..w {
            let cx = x + rx as i64;
            if cx < 0 || cx >= canvas_w as i64 {
                continue;
            }
            let di = dst_row + cx as usize * 4;
            blend_pixel(&mut canvas[di..di + 4], &rgb, alpha);
        }
    }
}

fn blend_pixel(dst: &mut [u8], src_rgb: &[u8], src_a: f32) {
    let da = dst[3] as f32 / 255.0;
    let out_a = src_a + da * (1.0 - src_a);
    if out_a <= 0.0 {
        return;
    }
    for c in 0..3 {
        let sc = src_rgb[c] as f32 / 255.0;
        let dc = dst[c] as f32 / 255.0;
        dst[c] = (((sc * src_a + dc * da * (1.0 - src_a)) / out_a) * 255.0).round() as u8;
    }
    dst[3] = (out_a * 255.0).round() as u8;
}

#[cfg(test)]
mod tests {
    use super::*;
    use hudburn_font::FontVariant;
    use hudburn_telemetry::{BarData, GlyphGrid};

    /// Font whose every glyph is solid opaque white.
    fn solid_font() -> Arc<GlyphBitmapSet> {
        let mut sheet = RgbaImage::new(24, 36 * 256);
        for pixel in sheet.pixels_mut() {
            *pixel = image::Rgba([255, 255, 255, 255]);
        }
        Arc::new(GlyphBitmapSet::from_sheet(sheet, FontVariant::Hd, "test").unwrap())
    }

    fn snapshot_with_grid(cols: u16, rows: u16, cells: Vec<u16>) -> TelemetrySnapshot {
        TelemetrySnapshot {
            time_ms: 0,
            seq: None,
            grid: GlyphGrid::from_cells(cols, rows, cells),
            bar: None,
        }
    }

    fn alpha_sum(frame: &[u8]) -> u64 {
        frame.iter().skip(3).step_by(4).map(|&a| a as u64).sum()
    }

    #[test]
    fn test_none_snapshot_renders_transparent() {
        let mut comp = Compositor::new(solid_font(), 64, 64);
        let frame = comp.render(None, &FrameRenderRequest::new(64, 64));
        assert_eq!(frame.len(), 64 * 64 * 4);
        assert_eq!(alpha_sum(frame), 0);
    }

    #[test]
    fn test_zero_opacity_renders_transparent() {
        let mut comp = Compositor::new(solid_font(), 64, 64);
        let snapshot = snapshot_with_grid(1, 1, vec![65]);
        let mut req = FrameRenderRequest::new(64, 64);
        req.opacity = 0.0;
        assert_eq!(alpha_sum(comp.render(Some(&snapshot), &req)), 0);
    }

    #[test]
    fn test_grid_auto_fit_centers_glyphs() {
        let mut comp = Compositor::new(solid_font(), 720, 720);
        let snapshot = snapshot_with_grid(1, 1, vec![65]);
        let frame = comp.render(Some(&snapshot), &FrameRenderRequest::new(720, 720));

        // One cell fills the canvas height: cell 480x720 centered at x=120.
        let px = |x: usize, y: usize| frame[(y * 720 + x) * 4 + 3];
        assert_eq!(px(360, 360), 255);
        assert_eq!(px(100, 360), 0);
        assert_eq!(px(620, 360), 0);
    }

    #[test]
    fn test_transparent_cells_stay_transparent() {
        let mut comp = Compositor::new(solid_font(), 128, 128);
        // Left cell empty, right cell drawn.
        let snapshot = snapshot_with_grid(2, 1, vec![0, 65]);
        let frame = comp.render(Some(&snapshot), &FrameRenderRequest::new(128, 128));
        let px = |x: usize, y: usize| frame[(y * 128 + x) * 4 + 3];
        assert_eq!(px(10, 64), 0);
        assert!(px(100, 64) > 0);
    }

    #[test]
    fn test_offset_clips_at_canvas_edge() {
        let mut comp = Compositor::new(solid_font(), 64, 64);
        let snapshot = snapshot_with_grid(1, 1, vec![65]);
        let mut req = FrameRenderRequest::new(64, 64);
        req.offset_x = 1000;
        let frame = comp.render(Some(&snapshot), &req);
        assert_eq!(frame.len(), 64 * 64 * 4);
        assert_eq!(alpha_sum(frame), 0);

        req.offset_x = 40;
        let frame = comp.render(Some(&snapshot), &req);
        assert!(alpha_sum(frame) > 0);
    }

    #[test]
    fn test_opacity_scales_alpha() {
        let mut comp = Compositor::new(solid_font(), 64, 64);
        let snapshot = snapshot_with_grid(1, 1, vec![65]);
        let mut req = FrameRenderRequest::new(64, 64);
        req.opacity = 0.5;
        req.show_bar = false;
        let frame = comp.render(Some(&snapshot), &req);
        let center = frame[(32 * 64 + 32) * 4 + 3];
        assert!((120..=135).contains(&center), "alpha was {center}");
    }

    #[test]
    fn test_canvas_buffer_is_reused() {
        let mut comp = Compositor::new(solid_font(), 64, 64);
        let snapshot = snapshot_with_grid(1, 1, vec![65]);
        let req = FrameRenderRequest::new(64, 64);
        let first = comp.render(Some(&snapshot), &req).as_ptr();
        let second = comp.render(Some(&snapshot), &req).as_ptr();
        assert_eq!(first, second);
    }

    #[test]
    fn test_bar_draws_in_bottom_band_only() {
        let mut comp = Compositor::new(solid_font(), 256, 256);
        let snapshot = TelemetrySnapshot {
            time_ms: 0,
            seq: None,
            grid: None,
            bar: Some(BarData {
                voltage_v: Some(15.3),
                altitude_m: Some(42.0),
                ..Default::default()
            }),
        };
        let frame = comp.render(Some(&snapshot), &FrameRenderRequest::new(256, 256));

        let band_alpha: u64 = (200..256)
            .flat_map(|y| (0..256).map(move |x| (y * 256 + x) * 4 + 3))
            .map(|i| frame[i] as u64)
            .sum();
        let top_alpha: u64 = (0..128)
            .flat_map(|y| (0..256).map(move |x| (y * 256 + x) * 4 + 3))
            .map(|i| frame[i] as u64)
            .sum();
        assert!(band_alpha > 0);
        assert_eq!(top_alpha, 0);

        // Suppressed when the request asks for no bar.
        let mut req = FrameRenderRequest::new(256, 256);
        req.show_bar = false;
        assert_eq!(alpha_sum(comp.render(Some(&snapshot), &req)), 0);
    }
}
