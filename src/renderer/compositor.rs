// Cell grid and cursors to instanced quads.
//
// Instance layout: one background quad per cell in [0, n), one glyph quad per cell
// in [n, 2n), then one quad per visible underline cursor. Every quad samples the
// atlas; backgrounds and cursors sample the solid pixel.

use std::collections::HashSet;
use std::ops::Range;

use crate::config::Color;
use crate::grid::CellGrid;
use crate::renderer::cursor::{underline_thickness, CursorType, Cursors};
use crate::renderer::damage::DamageTracker;
use crate::renderer::gpu::QuadInstance;
use crate::renderer::rasterizer::GlyphRasterizer;
use crate::renderer::surface::SurfaceBackend;
use crate::renderer::texture_atlas::{GlyphKey, TextureAtlas, TextureItem};

/// Grid dimensions and cell sizing computed from window size and font metrics.
#[derive(Debug, Clone, PartialEq)]
pub struct GridDimensions {
    pub columns: usize,
    pub rows: usize,
    /// Cell width in physical pixels.
    pub cell_width: f32,
    /// Cell height in physical pixels.
    pub cell_height: f32,
    pub window_width: u32,
    pub window_height: u32,
}

impl GridDimensions {
    /// Fit as many whole cells as possible, at least one in each direction.
    pub fn new(window_width: u32, window_height: u32, cell_width: f32, cell_height: f32) -> Self {
        let mut dims = Self {
            columns: 1,
            rows: 1,
            cell_width,
            cell_height,
            window_width,
            window_height,
        };
        dims.resize(window_width, window_height);
        dims
    }

    /// Recalculate for a new window size, keeping the cell size.
    pub fn resize(&mut self, window_width: u32, window_height: u32) {
        self.window_width = window_width;
        self.window_height = window_height;
        self.columns = (window_width as f32 / self.cell_width).floor().max(1.0) as usize;
        self.rows = (window_height as f32 / self.cell_height).floor().max(1.0) as usize;
    }

    /// Top-left pixel of a cell.
    pub fn cell_origin(&self, column: usize, row: usize) -> (f32, f32) {
        (column as f32 * self.cell_width, row as f32 * self.cell_height)
    }
}

/// What changed in the instance data during one `Compositor::update`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FrameUpdate {
    /// Every cell instance was rebuilt (resize or atlas growth).
    pub full: bool,
    /// Grid rows whose cell instances changed, coalesced into runs.
    pub dirty_rows: Vec<Range<usize>>,
}

/// Builds and caches the quad instances for a cell grid.
pub struct Compositor {
    dims: GridDimensions,
    shape: (usize, usize),
    instances: Vec<QuadInstance>,
    cursor_instances: Vec<QuadInstance>,
    /// Cells inverted by a block cursor when last built.
    cursor_cells: HashSet<usize>,
    atlas_generation: u64,
    unrenderable: HashSet<GlyphKey>,
    damage: DamageTracker,
}

impl Compositor {
    pub fn new(dims: GridDimensions) -> Self {
        Self {
            dims,
            shape: (0, 0),
            instances: Vec::new(),
            cursor_instances: Vec::new(),
            cursor_cells: HashSet::new(),
            atlas_generation: 0,
            unrenderable: HashSet::new(),
            damage: DamageTracker::new(0),
        }
    }

    pub fn dims(&self) -> &GridDimensions {
        &self.dims
    }

    /// Track a new window size. Returns the (columns, rows) that now fit.
    pub fn resize_window(&mut self, width: u32, height: u32) -> (usize, usize) {
        self.dims.resize(width, height);
        log::debug!(
            "Grid resized to {}x{} for {width}x{height}px",
            self.dims.columns,
            self.dims.rows
        );
        (self.dims.columns, self.dims.rows)
    }

    /// Number of cells in the last built grid.
    pub fn cell_count(&self) -> usize {
        self.shape.0 * self.shape.1
    }

    /// Background then glyph quads for every cell.
    pub fn cell_instances(&self) -> &[QuadInstance] {
        &self.instances
    }

    /// Underline cursor quads, drawn after the cells.
    pub fn cursor_instances(&self) -> &[QuadInstance] {
        &self.cursor_instances
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len() + self.cursor_instances.len()
    }

    /// Instance index ranges holding the background and glyph quads of `rows`.
    pub fn row_instance_ranges(&self, rows: Range<usize>) -> [Range<usize>; 2] {
        let columns = self.shape.0;
        let n = self.cell_count();
        let cells = rows.start * columns..rows.end * columns;
        [cells.clone(), n + cells.start..n + cells.end]
    }

    /// Keys that could not be rasterized or packed, skipped on later frames.
    pub fn unrenderable(&self) -> &HashSet<GlyphKey> {
        &self.unrenderable
    }

    /// Rebuild the instances of dirty cells and of cells whose block-cursor state
    /// changed, clear the grid's dirty flags, and rebuild the cursor quads.
    ///
    /// Glyphs missing from the atlas are rasterized and packed here. If that grows
    /// the atlas, every cell is rebuilt so no instance keeps stale coordinates.
    pub fn update<B, R>(
        &mut self,
        grid: &mut CellGrid,
        cursors: &Cursors,
        atlas: &mut TextureAtlas<B>,
        rasterizer: &mut R,
    ) -> FrameUpdate
    where
        B: SurfaceBackend,
        R: GlyphRasterizer,
    {
        let mut full = false;
        if grid.size() != self.shape {
            self.shape = grid.size();
            self.instances = vec![QuadInstance::EMPTY; 2 * self.cell_count()];
            self.damage.resize(self.shape.1);
            self.cursor_cells.clear();
            full = true;
        }

        let (columns, rows) = self.shape;
        let block_cells: HashSet<usize> = cursors
            .iter()
            .filter_map(|(_, c)| c.inverted_cell(columns, rows))
            .collect();

        let mut rebuild = grid.take_dirty();
        rebuild.extend(self.cursor_cells.symmetric_difference(&block_cells).copied());
        self.cursor_cells = block_cells;

        if self.atlas_generation != atlas.generation() {
            full = true;
        }

        loop {
            if full {
                rebuild = (0..self.cell_count()).collect();
            }
            let generation = atlas.generation();
            for &index in &rebuild {
                self.build_cell(index, grid, atlas, rasterizer);
                self.damage.mark_row_dirty(index / columns.max(1));
            }
            if atlas.generation() == generation {
                break;
            }
            full = true;
        }
        self.atlas_generation = atlas.generation();

        self.build_cursors(cursors, atlas);

        let update = FrameUpdate {
            full,
            dirty_rows: self.damage.dirty_spans(),
        };
        self.damage.clear();
        update
    }

    fn build_cell<B, R>(
        &mut self,
        index: usize,
        grid: &CellGrid,
        atlas: &mut TextureAtlas<B>,
        rasterizer: &mut R,
    ) where
        B: SurfaceBackend,
        R: GlyphRasterizer,
    {
        let cell = &grid.cells()[index];
        let n = self.cell_count();
        let inverted = cell.invert() ^ self.cursor_cells.contains(&index);
        let (fg, bg) = if inverted {
            (cell.bg(), cell.fg())
        } else {
            (cell.fg(), cell.bg())
        };
        let (x, y) = self.dims.cell_origin(cell.column(), cell.row());

        self.instances[index] = QuadInstance {
            rect: [x, y, self.dims.cell_width, self.dims.cell_height],
            uv: solid_uv(atlas),
            color: bg.to_linear_array(),
        };

        let glyph = cell
            .glyph_key()
            .and_then(|key| resolve(&mut self.unrenderable, key, atlas, rasterizer));
        self.instances[n + index] = match glyph {
            Some(item) => glyph_quad(&item, x, y, fg),
            None => QuadInstance::EMPTY,
        };
    }

    fn build_cursors<B: SurfaceBackend>(&mut self, cursors: &Cursors, atlas: &TextureAtlas<B>) {
        let (columns, rows) = self.shape;
        let mut underlines: Vec<_> = cursors
            .iter()
            .filter(|(_, c)| c.visible && c.cursor_type == CursorType::Under)
            .filter(|(_, c)| c.column < columns && c.row < rows)
            .collect();
        underlines.sort_by_key(|(id, _)| *id);

        let thickness = underline_thickness(self.dims.cell_height);
        let uv = solid_uv(atlas);
        self.cursor_instances = underlines
            .into_iter()
            .map(|(_, c)| {
                let (x, y) = self.dims.cell_origin(c.column, c.row);
                QuadInstance {
                    rect: [x, y + self.dims.cell_height - thickness, self.dims.cell_width, thickness],
                    uv,
                    color: c.color.to_linear_array(),
                }
            })
            .collect();
    }
}

/// Byte offset of an instance in the instance buffer.
pub fn instance_byte_offset(index: usize) -> u64 {
    (index * std::mem::size_of::<QuadInstance>()) as u64
}

/// UV rect collapsed to the center of the solid pixel, so filtering never
/// reaches neighbouring glyphs.
fn solid_uv<B: SurfaceBackend>(atlas: &TextureAtlas<B>) -> [f32; 4] {
    let uv = atlas.solid().uv();
    let u = (uv.left + uv.right) / 2.0;
    let v = (uv.top + uv.bottom) / 2.0;
    [u, v, u, v]
}

fn glyph_quad(item: &TextureItem, x: f32, y: f32, fg: Color) -> QuadInstance {
    let rect = item.pixel_rect();
    QuadInstance {
        rect: [
            x + item.left_bearing(),
            y + item.top_bearing(),
            rect.width() as f32,
            rect.height() as f32,
        ],
        uv: item.uv().to_array(),
        color: fg.to_linear_array(),
    }
}

/// Find `key` in the atlas, rasterizing and packing it on a miss.
fn resolve<B, R>(
    unrenderable: &mut HashSet<GlyphKey>,
    key: GlyphKey,
    atlas: &mut TextureAtlas<B>,
    rasterizer: &mut R,
) -> Option<TextureItem>
where
    B: SurfaceBackend,
    R: GlyphRasterizer,
{
    if let Some(item) = atlas.item(key) {
        return Some(item.clone());
    }
    let GlyphKey::Glyph { ch, style } = key else {
        return None;
    };
    if unrenderable.contains(&key) {
        return None;
    }

    let Some(bitmap) = rasterizer.rasterize(ch, style) else {
        log::debug!("No glyph for {ch:?} ({style:?})");
        unrenderable.insert(key);
        return None;
    };
    match atlas.add_item(key, bitmap) {
        Ok(item) => Some(item),
        Err(e) => {
            log::error!("Cannot pack glyph {ch:?} ({style:?}): {e}");
            unrenderable.insert(key);
            None
        }
    }
}
