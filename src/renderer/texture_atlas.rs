// Dynamic glyph texture atlas: shelf packing into a single surface that grows
// and repacks itself when full.

use std::collections::HashMap;
use std::sync::Arc;

use crate::renderer::surface::SurfaceBackend;

/// Number of glyphs the first surface is sized for.
pub const INITIAL_GLYPH_CAPACITY: usize = 1024;

/// Glyphs added to the capacity target on every growth.
pub const GLYPH_CAPACITY_INCREMENT: usize = 1024;

/// Font style variant of a glyph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FontStyle {
    #[default]
    Regular,
    Bold,
    Italic,
    BoldItalic,
}

/// Key identifying an item in the atlas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GlyphKey {
    /// A single opaque pixel, used to draw flat-colored rectangles.
    Solid,
    Glyph { ch: char, style: FontStyle },
}

impl GlyphKey {
    pub fn glyph(ch: char, style: FontStyle) -> Self {
        Self::Glyph { ch, style }
    }
}

/// A single-channel coverage bitmap produced by a rasterizer.
#[derive(Debug, Clone, PartialEq)]
pub struct GlyphBitmap {
    /// Row-major coverage, exactly `width * height` bytes.
    pub pixels: Arc<[u8]>,
    pub width: u32,
    pub height: u32,
    /// Vertical offset of the bitmap from the top of its cell, in pixels.
    pub top_bearing: f32,
    /// Horizontal offset of the bitmap from the left of its cell, in pixels.
    pub left_bearing: f32,
}

impl GlyphBitmap {
    pub fn new(pixels: impl Into<Arc<[u8]>>, width: u32, height: u32) -> Self {
        Self {
            pixels: pixels.into(),
            width,
            height,
            top_bearing: 0.0,
            left_bearing: 0.0,
        }
    }

    pub fn with_bearings(mut self, top_bearing: f32, left_bearing: f32) -> Self {
        self.top_bearing = top_bearing;
        self.left_bearing = left_bearing;
        self
    }

    fn solid() -> Self {
        Self::new(vec![0xFF], 1, 1)
    }
}

/// Rectangle in atlas pixels; `right` and `bottom` are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl PixelRect {
    pub fn width(&self) -> u32 {
        self.right - self.left
    }

    pub fn height(&self) -> u32 {
        self.bottom - self.top
    }

    pub fn intersects(&self, other: &PixelRect) -> bool {
        self.left < other.right
            && other.left < self.right
            && self.top < other.bottom
            && other.top < self.bottom
    }
}

/// Rectangle in normalized texture coordinates, each component in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UvRect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl UvRect {
    pub fn to_array(self) -> [f32; 4] {
        [self.left, self.top, self.right, self.bottom]
    }
}

/// Where a bitmap was packed. Positions are only valid for the atlas generation
/// the item was packed in; re-resolve by key after a growth.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureItem {
    key: GlyphKey,
    pixel: PixelRect,
    uv: UvRect,
    bitmap: GlyphBitmap,
    generation: u64,
}

impl TextureItem {
    pub fn key(&self) -> GlyphKey {
        self.key
    }

    pub fn pixel_rect(&self) -> PixelRect {
        self.pixel
    }

    pub fn uv(&self) -> UvRect {
        self.uv
    }

    pub fn top_bearing(&self) -> f32 {
        self.bitmap.top_bearing
    }

    pub fn left_bearing(&self) -> f32 {
        self.bitmap.left_bearing
    }

    pub fn pixels(&self) -> &[u8] {
        &self.bitmap.pixels
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Errors reported by `TextureAtlas::add_item`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AtlasError {
    #[error("glyph {width}x{height} exceeds the maximum glyph size {max_width}x{max_height}")]
    GlyphTooLarge {
        width: u32,
        height: u32,
        max_width: u32,
        max_height: u32,
    },
    #[error("glyph bitmap has zero area")]
    EmptyGlyph,
    #[error("atlas surface {width}x{height} is at its maximum size and full ({items} items)")]
    SurfaceLimit { width: u32, height: u32, items: usize },
}

/// Fixed-height rows filled left to right, top to bottom.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ShelfPacker {
    width: u32,
    height: u32,
    row_height: u32,
    next_x: u32,
    next_y: u32,
}

impl ShelfPacker {
    fn new(width: u32, height: u32, row_height: u32) -> Self {
        Self {
            width,
            height,
            row_height,
            next_x: 0,
            next_y: 0,
        }
    }

    /// Reserve space for a `width` x `height` bitmap, returning its top-left corner.
    /// The packer is unchanged when the surface has no room left.
    fn allocate(&mut self, width: u32, height: u32) -> Option<(u32, u32)> {
        let mut x = self.next_x;
        let mut y = self.next_y;

        if x + width > self.width {
            // A new row must fit entirely below the current one.
            if y + 2 * self.row_height > self.height {
                return None;
            }
            x = 0;
            y += self.row_height;
        }

        if x + width > self.width || y + height > self.height {
            return None;
        }

        self.next_x = x + width;
        self.next_y = y;
        Some((x, y))
    }
}

/// Side length of a square surface for `capacity` glyphs of the given size.
///
/// This is an estimate, not a guarantee: shelf waste can exhaust the surface
/// before `capacity` glyphs are placed, in which case the atlas grows again.
pub fn surface_side(capacity: usize, glyph_width: u32, glyph_height: u32, max_dimension: u32) -> u32 {
    let area = capacity as f64 * glyph_width as f64 * glyph_height as f64;
    (area.sqrt() as u32).min(max_dimension).max(1)
}

/// Packs glyph bitmaps into one surface owned by the atlas.
///
/// Not thread-safe by design: it lives on the render thread alongside the
/// surface it writes to.
pub struct TextureAtlas<B: SurfaceBackend> {
    backend: B,
    surface: B::Surface,
    items: HashMap<GlyphKey, TextureItem>,
    packer: ShelfPacker,
    max_glyph_width: u32,
    max_glyph_height: u32,
    glyph_capacity: usize,
    generation: u64,
}

impl<B: SurfaceBackend> TextureAtlas<B> {
    /// Create an atlas sized for `INITIAL_GLYPH_CAPACITY` glyphs of at most
    /// `max_glyph_width` x `max_glyph_height` pixels.
    pub fn new(backend: B, max_glyph_width: u32, max_glyph_height: u32) -> Result<Self, AtlasError> {
        Self::with_capacity(backend, max_glyph_width, max_glyph_height, INITIAL_GLYPH_CAPACITY)
    }

    /// Create an atlas whose first surface is sized for `glyph_capacity` glyphs.
    pub fn with_capacity(
        mut backend: B,
        max_glyph_width: u32,
        max_glyph_height: u32,
        glyph_capacity: usize,
    ) -> Result<Self, AtlasError> {
        let max_glyph_width = max_glyph_width.max(1);
        let max_glyph_height = max_glyph_height.max(1);
        let side = surface_side(
            glyph_capacity,
            max_glyph_width,
            max_glyph_height,
            backend.max_dimension(),
        );
        let surface = backend.create_surface(side, side);

        let mut atlas = Self {
            backend,
            surface,
            items: HashMap::new(),
            packer: ShelfPacker::new(side, side, max_glyph_height),
            max_glyph_width,
            max_glyph_height,
            glyph_capacity,
            generation: 0,
        };
        atlas.add_item(GlyphKey::Solid, GlyphBitmap::solid())?;

        log::info!(
            "Texture atlas: {side}x{side} for ~{glyph_capacity} glyphs of {max_glyph_width}x{max_glyph_height}"
        );
        Ok(atlas)
    }

    /// Pack `bitmap` under `key`, growing the surface if it is full.
    ///
    /// Adding a key that is already present replaces its item.
    ///
    /// # Panics
    /// If `bitmap.pixels` is not exactly `width * height` bytes.
    pub fn add_item(&mut self, key: GlyphKey, bitmap: GlyphBitmap) -> Result<TextureItem, AtlasError> {
        assert_eq!(
            bitmap.pixels.len(),
            (bitmap.width as usize) * (bitmap.height as usize),
            "pixel buffer for {key:?} does not match {}x{}",
            bitmap.width,
            bitmap.height,
        );

        if bitmap.width == 0 || bitmap.height == 0 {
            return Err(AtlasError::EmptyGlyph);
        }
        if bitmap.width > self.max_glyph_width || bitmap.height > self.max_glyph_height {
            return Err(AtlasError::GlyphTooLarge {
                width: bitmap.width,
                height: bitmap.height,
                max_width: self.max_glyph_width,
                max_height: self.max_glyph_height,
            });
        }

        let (x, y) = loop {
            if let Some(origin) = self.packer.allocate(bitmap.width, bitmap.height) {
                break origin;
            }
            self.grow()?;
        };

        let item = place(
            &mut self.backend,
            &mut self.surface,
            &self.packer,
            key,
            bitmap,
            (x, y),
            self.generation,
        );
        self.items.insert(key, item.clone());
        Ok(item)
    }

    /// Look up a packed item. `None` means the glyph has not been added yet.
    pub fn item(&self, key: GlyphKey) -> Option<&TextureItem> {
        self.items.get(&key)
    }

    /// The reserved 1x1 opaque item.
    pub fn solid(&self) -> &TextureItem {
        self.items
            .get(&GlyphKey::Solid)
            .expect("solid item is inserted at construction and kept across growth")
    }

    /// Whether `item` was packed into the current surface.
    pub fn is_current(&self, item: &TextureItem) -> bool {
        item.generation == self.generation
    }

    /// Incremented every time the surface is replaced.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn surface(&self) -> &B::Surface {
        &self.surface
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn width(&self) -> u32 {
        self.packer.width
    }

    pub fn height(&self) -> u32 {
        self.packer.height
    }

    pub fn glyph_capacity(&self) -> usize {
        self.glyph_capacity
    }

    /// Number of items, including the solid item.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Replace the surface with a larger one and re-admit every item.
    ///
    /// The new surface is fully populated before it replaces the old one; on
    /// error the atlas is left untouched.
    fn grow(&mut self) -> Result<(), AtlasError> {
        let mut capacity = self.glyph_capacity;
        loop {
            capacity += GLYPH_CAPACITY_INCREMENT;
            let side = surface_side(
                capacity,
                self.max_glyph_width,
                self.max_glyph_height,
                self.backend.max_dimension(),
            );
            if side <= self.packer.width {
                log::error!(
                    "Texture atlas cannot grow beyond {}x{} ({} items)",
                    self.packer.width,
                    self.packer.height,
                    self.items.len()
                );
                return Err(AtlasError::SurfaceLimit {
                    width: self.packer.width,
                    height: self.packer.height,
                    items: self.items.len(),
                });
            }

            if let Some((surface, packer, items)) = self.repack(side) {
                self.surface = surface;
                self.packer = packer;
                self.items = items;
                self.glyph_capacity = capacity;
                self.generation += 1;
                log::warn!(
                    "Increased texture atlas size to {side}x{side} for {} items",
                    self.items.len()
                );
                return Ok(());
            }
        }
    }

    /// Build a `side` x `side` surface holding every current item, in their
    /// current packing order. Returns `None` if they do not all fit.
    #[allow(clippy::type_complexity)]
    fn repack(&mut self, side: u32) -> Option<(B::Surface, ShelfPacker, HashMap<GlyphKey, TextureItem>)> {
        let mut order: Vec<&TextureItem> = self.items.values().collect();
        order.sort_by_key(|item| (item.pixel.top, item.pixel.left));

        let generation = self.generation + 1;
        let mut surface = self.backend.create_surface(side, side);
        let mut packer = ShelfPacker::new(side, side, self.max_glyph_height);
        let mut items = HashMap::with_capacity(self.items.len());

        for old in order {
            let origin = packer.allocate(old.bitmap.width, old.bitmap.height)?;
            let item = place(
                &mut self.backend,
                &mut surface,
                &packer,
                old.key,
                old.bitmap.clone(),
                origin,
                generation,
            );
            items.insert(old.key, item);
        }

        Some((surface, packer, items))
    }
}

/// Write `bitmap` at `origin` and describe where it landed.
fn place<B: SurfaceBackend>(
    backend: &mut B,
    surface: &mut B::Surface,
    packer: &ShelfPacker,
    key: GlyphKey,
    bitmap: GlyphBitmap,
    (x, y): (u32, u32),
    generation: u64,
) -> TextureItem {
    let pixel = PixelRect {
        left: x,
        top: y,
        right: x + bitmap.width,
        bottom: y + bitmap.height,
    };
    backend.write_region(surface, pixel, &bitmap.pixels);

    let w = packer.width as f32;
    let h = packer.height as f32;
    TextureItem {
        key,
        pixel,
        uv: UvRect {
            left: pixel.left as f32 / w,
            top: pixel.top as f32 / h,
            right: pixel.right as f32 / w,
            bottom: pixel.bottom as f32 / h,
        },
        bitmap,
        generation,
    }
}
