// The cell grid: per-cell character, style, colors and dirty state.

use crate::config::Color;
use crate::renderer::texture_atlas::{FontStyle, GlyphKey};

/// Errors from coordinate-based grid access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GridError {
    #[error("cell ({column}, {row}) is outside the {columns}x{rows} grid")]
    OutOfRange {
        column: usize,
        row: usize,
        columns: usize,
        rows: usize,
    },
}

/// One character cell. Every setter marks the cell dirty.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    column: usize,
    row: usize,
    ch: char,
    style: FontStyle,
    fg: Color,
    bg: Color,
    invert: bool,
    dirty: bool,
}

impl Cell {
    fn blank(column: usize, row: usize, fg: Color, bg: Color) -> Self {
        Self {
            column,
            row,
            ch: ' ',
            style: FontStyle::Regular,
            fg,
            bg,
            invert: false,
            dirty: true,
        }
    }

    pub fn column(&self) -> usize {
        self.column
    }

    pub fn row(&self) -> usize {
        self.row
    }

    pub fn ch(&self) -> char {
        self.ch
    }

    pub fn style(&self) -> FontStyle {
        self.style
    }

    pub fn fg(&self) -> Color {
        self.fg
    }

    pub fn bg(&self) -> Color {
        self.bg
    }

    pub fn invert(&self) -> bool {
        self.invert
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Atlas key for the displayed glyph; `None` for cells showing only background.
    pub fn glyph_key(&self) -> Option<GlyphKey> {
        if self.ch.is_whitespace() || self.ch.is_control() {
            None
        } else {
            Some(GlyphKey::glyph(self.ch, self.style))
        }
    }

    pub fn set_char(&mut self, ch: char) {
        self.ch = ch;
        self.dirty = true;
    }

    pub fn set_style(&mut self, style: FontStyle) {
        self.style = style;
        self.dirty = true;
    }

    pub fn set_fg(&mut self, fg: Color) {
        self.fg = fg;
        self.dirty = true;
    }

    pub fn set_bg(&mut self, bg: Color) {
        self.bg = bg;
        self.dirty = true;
    }

    /// Swap foreground and background when drawn.
    pub fn set_invert(&mut self, invert: bool) {
        self.invert = invert;
        self.dirty = true;
    }

    /// Force a redraw without changing content.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }
}

/// A row-major grid of cells sized from the window.
#[derive(Debug, Clone)]
pub struct CellGrid {
    columns: usize,
    rows: usize,
    cells: Vec<Cell>,
    default_fg: Color,
    default_bg: Color,
}

impl CellGrid {
    /// Create a grid of blank cells in the default colors. All cells start dirty.
    pub fn new(columns: usize, rows: usize, default_fg: Color, default_bg: Color) -> Self {
        Self {
            columns,
            rows,
            cells: blank_cells(columns, rows, default_fg, default_bg),
            default_fg,
            default_bg,
        }
    }

    /// (columns, rows)
    pub fn size(&self) -> (usize, usize) {
        (self.columns, self.rows)
    }

    pub fn default_colors(&self) -> (Color, Color) {
        (self.default_fg, self.default_bg)
    }

    /// Colors given to cells created by later resizes.
    pub fn set_default_colors(&mut self, fg: Color, bg: Color) {
        self.default_fg = fg;
        self.default_bg = bg;
    }

    pub fn cell(&self, column: usize, row: usize) -> Result<&Cell, GridError> {
        let index = self.index(column, row)?;
        Ok(&self.cells[index])
    }

    pub fn cell_mut(&mut self, column: usize, row: usize) -> Result<&mut Cell, GridError> {
        let index = self.index(column, row)?;
        Ok(&mut self.cells[index])
    }

    pub fn set_char(&mut self, column: usize, row: usize, ch: char) -> Result<(), GridError> {
        self.cell_mut(column, row)?.set_char(ch);
        Ok(())
    }

    /// Write `text` one character per cell from (`column`, `row`), clipping at the
    /// right edge. Returns how many cells were written; an out-of-range row writes none.
    pub fn print_at(&mut self, column: usize, row: usize, text: &str) -> usize {
        if row >= self.rows || column >= self.columns {
            return 0;
        }
        let start = row * self.columns + column;
        let room = self.columns - column;
        let mut written = 0;
        for (cell, ch) in self.cells[start..start + room].iter_mut().zip(text.chars()) {
            cell.set_char(ch);
            written += 1;
        }
        written
    }

    /// Replace the character of every cell.
    pub fn set_all_cells_char(&mut self, ch: char) {
        for cell in &mut self.cells {
            cell.set_char(ch);
        }
    }

    /// Replace every cell with a blank one in the default colors.
    pub fn resize(&mut self, columns: usize, rows: usize) {
        self.columns = columns;
        self.rows = rows;
        self.cells = blank_cells(columns, rows, self.default_fg, self.default_bg);
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn dirty_count(&self) -> usize {
        self.cells.iter().filter(|c| c.dirty).count()
    }

    /// Row-major indices of dirty cells, clearing their flags.
    pub(crate) fn take_dirty(&mut self) -> Vec<usize> {
        self.cells
            .iter_mut()
            .enumerate()
            .filter_map(|(i, cell)| std::mem::take(&mut cell.dirty).then_some(i))
            .collect()
    }

    fn index(&self, column: usize, row: usize) -> Result<usize, GridError> {
        if column >= self.columns || row >= self.rows {
            return Err(GridError::OutOfRange {
                column,
                row,
                columns: self.columns,
                rows: self.rows,
            });
        }
        Ok(row * self.columns + column)
    }
}

fn blank_cells(columns: usize, rows: usize, fg: Color, bg: Color) -> Vec<Cell> {
    (0..rows)
        .flat_map(|row| (0..columns).map(move |column| Cell::blank(column, row, fg, bg)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn grid_80x24() -> CellGrid {
        let mut grid = CellGrid::new(80, 24, Color::WHITE, Color::BLACK);
        grid.take_dirty();
        grid
    }

    // ── Construction ────────────────────────────────────────────────

    #[test]
    fn new_grid_is_blank_and_dirty() {
        let grid = CellGrid::new(4, 3, Color::WHITE, Color::BLACK);
        assert_eq!(grid.size(), (4, 3));
        assert_eq!(grid.cells().len(), 12);
        assert_eq!(grid.dirty_count(), 12);
        let cell = grid.cell(3, 2).unwrap();
        assert_eq!((cell.column(), cell.row()), (3, 2));
        assert_eq!(cell.ch(), ' ');
        assert_eq!(cell.fg(), Color::WHITE);
        assert_eq!(cell.bg(), Color::BLACK);
        assert!(cell.glyph_key().is_none());
    }

    // ── Access ──────────────────────────────────────────────────────

    #[rstest]
    #[case(80, 0)]
    #[case(0, 24)]
    #[case(100, 100)]
    fn out_of_range_access_is_an_error(#[case] column: usize, #[case] row: usize) {
        let mut grid = grid_80x24();
        let expected = GridError::OutOfRange {
            column,
            row,
            columns: 80,
            rows: 24,
        };
        assert_eq!(grid.cell(column, row).unwrap_err(), expected);
        assert_eq!(grid.set_char(column, row, 'x').unwrap_err(), expected);
        assert_eq!(grid.dirty_count(), 0);
    }

    #[test]
    fn setters_mark_dirty() {
        let mut grid = grid_80x24();
        let cell = grid.cell_mut(1, 1).unwrap();
        cell.set_fg(Color::BLACK);
        assert!(cell.is_dirty());

        grid.take_dirty();
        grid.cell_mut(1, 1).unwrap().set_style(FontStyle::Bold);
        grid.cell_mut(2, 1).unwrap().set_invert(true);
        grid.cell_mut(3, 1).unwrap().set_bg(Color::WHITE);
        grid.cell_mut(4, 1).unwrap().mark_dirty();
        assert_eq!(grid.take_dirty(), vec![81, 82, 83, 84]);
    }

    #[test]
    fn glyph_key_uses_char_and_style() {
        let mut grid = grid_80x24();
        let cell = grid.cell_mut(0, 0).unwrap();
        cell.set_char('g');
        cell.set_style(FontStyle::Italic);
        assert_eq!(cell.glyph_key(), Some(GlyphKey::glyph('g', FontStyle::Italic)));
    }

    // ── print_at ────────────────────────────────────────────────────

    #[test]
    fn print_at_writes_and_dirties_cells() {
        let mut grid = grid_80x24();
        assert_eq!(grid.print_at(0, 0, "ABC"), 3);
        for (column, ch) in ['A', 'B', 'C'].into_iter().enumerate() {
            let cell = grid.cell(column, 0).unwrap();
            assert_eq!(cell.ch(), ch);
            assert!(cell.is_dirty());
        }
        assert!(!grid.cell(3, 0).unwrap().is_dirty());
        assert_eq!(grid.take_dirty(), vec![0, 1, 2]);
        assert_eq!(grid.dirty_count(), 0);
    }

    #[test]
    fn print_at_clips_at_right_edge() {
        let mut grid = grid_80x24();
        assert_eq!(grid.print_at(78, 0, "HELLO"), 2);
        assert_eq!(grid.cell(78, 0).unwrap().ch(), 'H');
        assert_eq!(grid.cell(79, 0).unwrap().ch(), 'E');
        // Nothing wraps onto the next row.
        assert_eq!(grid.cell(0, 1).unwrap().ch(), ' ');
        assert_eq!(grid.dirty_count(), 2);
    }

    #[rstest]
    #[case(0, 24)]
    #[case(80, 0)]
    fn print_at_outside_grid_writes_nothing(#[case] column: usize, #[case] row: usize) {
        let mut grid = grid_80x24();
        assert_eq!(grid.print_at(column, row, "X"), 0);
        assert_eq!(grid.dirty_count(), 0);
    }

    #[test]
    fn print_at_counts_chars_not_bytes() {
        let mut grid = grid_80x24();
        assert_eq!(grid.print_at(0, 0, "héllo"), 5);
        assert_eq!(grid.cell(1, 0).unwrap().ch(), 'é');
    }

    // ── Bulk operations ─────────────────────────────────────────────

    #[test]
    fn set_all_cells_char_dirties_everything() {
        let mut grid = grid_80x24();
        grid.set_all_cells_char('#');
        assert_eq!(grid.dirty_count(), 80 * 24);
        assert!(grid.cells().iter().all(|c| c.ch() == '#'));
    }

    #[test]
    fn resize_replaces_cells_with_defaults() {
        let mut grid = grid_80x24();
        grid.print_at(0, 0, "old");
        grid.set_default_colors(Color::BLACK, Color::WHITE);
        grid.resize(10, 5);
        assert_eq!(grid.size(), (10, 5));
        assert_eq!(grid.cells().len(), 50);
        assert_eq!(grid.dirty_count(), 50);
        let cell = grid.cell(0, 0).unwrap();
        assert_eq!(cell.ch(), ' ');
        assert_eq!(cell.fg(), Color::BLACK);
        assert_eq!(cell.bg(), Color::WHITE);
        assert_eq!((grid.cell(9, 4).unwrap().column(), grid.cell(9, 4).unwrap().row()), (9, 4));
    }

    #[test]
    fn zero_sized_grid_rejects_every_coordinate() {
        let mut grid = CellGrid::new(0, 0, Color::WHITE, Color::BLACK);
        assert!(grid.cell(0, 0).is_err());
        assert_eq!(grid.print_at(0, 0, "a"), 0);
        assert!(grid.take_dirty().is_empty());
    }
}
