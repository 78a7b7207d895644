// Glyph rasterization into cell-sized coverage bitmaps.

use cosmic_text::{Attrs, Buffer, Family, FontSystem, Metrics, Shaping, Style, SwashCache, Weight};

use crate::renderer::texture_atlas::{FontStyle, GlyphBitmap};

/// Line height as a multiple of the font size.
const LINE_HEIGHT_FACTOR: f32 = 1.25;

/// Produces coverage bitmaps for characters in a fixed-size cell.
pub trait GlyphRasterizer {
    /// Cell size in pixels; every bitmap fits within it.
    fn cell_size(&self) -> (u32, u32);

    /// Rasterize `ch` in `style`. Returns `None` for characters with no visible
    /// coverage (whitespace, or glyphs no loaded font can draw).
    fn rasterize(&mut self, ch: char, style: FontStyle) -> Option<GlyphBitmap>;
}

/// Rasterizer backed by cosmic-text and the system font database.
pub struct CosmicRasterizer {
    font_system: FontSystem,
    swash_cache: SwashCache,
    buffer: Buffer,
    family: String,
    cell_width: u32,
    cell_height: u32,
}

impl CosmicRasterizer {
    /// Load system fonts and measure the cell for `family` at `font_size` pixels.
    pub fn new(family: &str, font_size: f32) -> Self {
        let line_height = (font_size * LINE_HEIGHT_FACTOR).ceil();
        let mut font_system = FontSystem::new();
        let metrics = Metrics::new(font_size, line_height);

        let mut buffer = Buffer::new(&mut font_system, metrics);
        buffer.set_text(
            &mut font_system,
            "M",
            attrs_for(family, FontStyle::Regular),
            Shaping::Advanced,
        );
        buffer.set_size(&mut font_system, Some(font_size * 4.0), Some(line_height * 2.0));
        buffer.shape_until_scroll(&mut font_system, true);

        let cell_width = buffer
            .layout_runs()
            .next()
            .and_then(|run| run.glyphs.first())
            .map(|g| g.w)
            .unwrap_or(font_size * 0.6);

        let cell_width = (cell_width.ceil() as u32).max(1);
        let cell_height = (line_height as u32).max(1);
        log::info!("Rasterizer: family {family:?} at {font_size}px, cell {cell_width}x{cell_height}");

        Self {
            font_system,
            swash_cache: SwashCache::new(),
            buffer,
            family: family.to_string(),
            cell_width,
            cell_height,
        }
    }
}

impl GlyphRasterizer for CosmicRasterizer {
    fn cell_size(&self) -> (u32, u32) {
        (self.cell_width, self.cell_height)
    }

    fn rasterize(&mut self, ch: char, style: FontStyle) -> Option<GlyphBitmap> {
        if ch.is_whitespace() || ch.is_control() {
            return None;
        }

        let Self {
            font_system,
            swash_cache,
            buffer,
            family,
            cell_width,
            cell_height,
        } = self;
        let (w, h) = (*cell_width, *cell_height);

        let mut text = [0u8; 4];
        buffer.set_text(
            font_system,
            ch.encode_utf8(&mut text),
            attrs_for(family, style),
            Shaping::Advanced,
        );
        buffer.set_size(font_system, Some(w as f32 * 2.0), Some(h as f32 * 2.0));
        buffer.shape_until_scroll(font_system, true);

        let mut pixels = vec![0u8; (w * h) as usize];
        let white = cosmic_text::Color::rgb(0xFF, 0xFF, 0xFF);
        buffer.draw(font_system, swash_cache, white, |x, y, _w, _h, c| {
            if x >= 0 && y >= 0 && (x as u32) < w && (y as u32) < h {
                let idx = (y as u32 * w + x as u32) as usize;
                pixels[idx] = pixels[idx].max(c.a());
            }
        });

        if pixels.iter().all(|&p| p == 0) {
            return None;
        }
        Some(GlyphBitmap::new(pixels, w, h))
    }
}

fn attrs_for(family: &str, style: FontStyle) -> Attrs<'_> {
    let family = match family.to_lowercase().as_str() {
        "monospace" => Family::Monospace,
        "serif" => Family::Serif,
        "sans-serif" => Family::SansSerif,
        _ => Family::Name(family),
    };
    let attrs = Attrs::new().family(family);
    match style {
        FontStyle::Regular => attrs,
        FontStyle::Bold => attrs.weight(Weight::BOLD),
        FontStyle::Italic => attrs.style(Style::Italic),
        FontStyle::BoldItalic => attrs.weight(Weight::BOLD).style(Style::Italic),
    }
}
