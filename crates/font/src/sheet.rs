//! Font-sheet layout detection and glyph extraction.
//!
//! Sheet geometry is inferred from the PNG dimensions alone:
//!
//! - every sheet is 256 glyph rows tall, so `tile_h = height / 256`
//! - glyphs keep a 2:3 aspect ratio, giving the base tile width per
//!   height: 36→24, 54→36, 72→48, 108→72
//! - `n_pages = width / base_tile_w`; page `p` holds codes
//!   `p*256 ..= p*256+255`

use std::path::Path;

use image::RgbaImage;

use hudburn_common::error::{HudburnError, HudburnResult};

/// Glyph rows in every font sheet.
pub const SHEET_ROWS: u32 = 256;

/// SD or HD glyph resolution. HD sheets use smaller tiles because HD
/// grids pack more cells onto the same video frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontVariant {
    Sd,
    Hd,
}

impl FontVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            FontVariant::Sd => "SD",
            FontVariant::Hd => "HD",
        }
    }
}

/// One glyph's pixels, RGBA8 row-major.
#[derive(Debug, Clone)]
pub struct GlyphBitmap {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// All glyphs of one font variant, extracted up front and shared
/// read-only across every frame of a job.
#[derive(Debug)]
pub struct GlyphBitmapSet {
    name: String,
    variant: FontVariant,
    tile_w: u32,
    tile_h: u32,
    glyphs: Vec<GlyphBitmap>,
}

impl GlyphBitmapSet {
    /// Extract every glyph from a decoded sheet image.
    pub fn from_sheet(
        sheet: RgbaImage,
        variant: FontVariant,
        name: impl Into<String>,
    ) -> HudburnResult<Self> {
        let (tile_w, tile_h, n_pages) = detect_layout(&sheet)?;

        let mut glyphs = Vec::with_capacity((n_pages * SHEET_ROWS) as usize);
        for page in 0..n_pages {
            for row in 0..SHEET_ROWS {
                let x = page * tile_w;
                let y = row * tile_h;
                let tile = image::imageops::crop_imm(&sheet, x, y, tile_w, tile_h).to_image();
                glyphs.push(GlyphBitmap {
                    width: tile_w,
                    height: tile_h,
                    rgba: tile.into_raw(),
                });
            }
        }

        let name = name.into();
        tracing::info!(
            font = %name,
            variant = variant.as_str(),
            tile_w,
            tile_h,
            pages = n_pages,
            "Loaded font sheet"
        );

        Ok(Self {
            name,
            variant,
            tile_w,
            tile_h,
            glyphs,
        })
    }

    /// Glyph bitmap for a character code, or `None` past the last page.
    ///
    /// Codes beyond the sheet's pages are the renderer's problem to treat
    /// as blank; the set never fails a lookup.
    pub fn get(&self, code: u16) -> Option<&GlyphBitmap> {
        self.glyphs.get(code as usize)
    }

    pub fn tile_w(&self) -> u32 {
        self.tile_w
    }

    pub fn tile_h(&self) -> u32 {
        self.tile_h
    }

    pub fn glyph_count(&self) -> usize {
        self.glyphs.len()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn variant(&self) -> FontVariant {
        self.variant
    }
}

/// Base tile width by tile height (2:3 glyph aspect).
fn base_width_for(tile_h: u32) -> Option<u32> {
    match tile_h {
        36 => Some(24),
        54 => Some(36),
        72 => Some(48),
        108 => Some(72),
        _ => None,
    }
}

fn detect_layout(sheet: &RgbaImage) -> HudburnResult<(u32, u32, u32)> {
    if sheet.height() < SHEET_ROWS || sheet.height() % SHEET_ROWS != 0 {
        return Err(HudburnError::font(format!(
            "sheet height {} is not a multiple of {SHEET_ROWS} glyph rows",
            sheet.height()
        )));
    }
    let tile_h = sheet.height() / SHEET_ROWS;

    if let Some(base_w) = base_width_for(tile_h) {
        if sheet.width() % base_w == 0 {
            return Ok((base_w, tile_h, sheet.width() / base_w));
        }
    }

    // Non-standard tile height: try the known base widths before giving
    // up and treating the sheet as a single column.
    for bw in [24u32, 36, 48, 72] {
        if sheet.width() % bw == 0 {
            return Ok((bw, tile_h, sheet.width() / bw));
        }
    }

    Ok((sheet.width(), tile_h, 1))
}

/// Load the glyph set for a font folder, preferring the requested variant.
///
/// Folders hold `*_hd.png` and plain `*.png` sheets; the preferred variant
/// is tried first, then the other, then any PNG at all. Fails with
/// `FontNotFound` when the folder has no usable sheet — a job-start
/// failure, never a per-frame one.
pub fn load_bitmaps(folder: &Path, prefer: FontVariant) -> HudburnResult<GlyphBitmapSet> {
    if !folder.is_dir() {
        return Err(HudburnError::FontNotFound {
            path: folder.to_path_buf(),
        });
    }

    let mut pngs: Vec<_> = std::fs::read_dir(folder)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .map(|ext| ext.eq_ignore_ascii_case("png"))
                .unwrap_or(false)
        })
        .collect();
    pngs.sort();

    if pngs.is_empty() {
        return Err(HudburnError::FontNotFound {
            path: folder.to_path_buf(),
        });
    }

    let is_hd = |path: &Path| {
        path.file_stem()
            .and_then(|stem| stem.to_str())
            .map(|stem| stem.to_ascii_lowercase().ends_with("_hd"))
            .unwrap_or(false)
    };

    let preferred = pngs
        .iter()
        .find(|p| is_hd(p) == matches!(prefer, FontVariant::Hd));
    let (path, variant) = match preferred {
        Some(path) => (path.clone(), prefer),
        None => {
            let fallback = pngs[0].clone();
            let variant = if is_hd(&fallback) {
                FontVariant::Hd
            } else {
                FontVariant::Sd
            };
            (fallback, variant)
        }
    };

    let sheet = image::open(&path)
        .map_err(|e| HudburnError::font(format!("failed to decode {}: {e}", path.display())))?
        .to_rgba8();

    let name = folder
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("font")
        .to_string();

    GlyphBitmapSet::from_sheet(sheet, variant, name)
}
