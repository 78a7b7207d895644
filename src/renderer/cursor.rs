// Overlay cursors: an id-keyed set of block and underline cursors drawn on top of cells.

use std::collections::HashMap;

use crate::config::Color;

/// How a cursor is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CursorType {
    /// A thin bar along the bottom edge of the cell, in the cursor color.
    #[default]
    Under,
    /// Inverts the foreground and background of the cell.
    Block,
}

/// A cursor positioned on a grid cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cursor {
    pub column: usize,
    pub row: usize,
    pub color: Color,
    pub cursor_type: CursorType,
    /// Hidden cursors stay in the set but are not drawn.
    pub visible: bool,
}

impl Cursor {
    pub fn new(column: usize, row: usize, color: Color, cursor_type: CursorType) -> Self {
        Self {
            column,
            row,
            color,
            cursor_type,
            visible: true,
        }
    }

    /// Row-major index of the cell this cursor inverts in a `columns` x `rows` grid.
    /// `None` for hidden or underline cursors and for cursors outside the grid.
    pub fn inverted_cell(&self, columns: usize, rows: usize) -> Option<usize> {
        let inverts = self.visible
            && self.cursor_type == CursorType::Block
            && self.column < columns
            && self.row < rows;
        inverts.then(|| self.row * columns + self.column)
    }
}

/// Height in pixels of an underline cursor for the given cell height.
pub fn underline_thickness(cell_height: f32) -> f32 {
    (cell_height * 0.1).round().max(1.0)
}

/// Identifier of a cursor within one `Cursors` set. Never reused by that set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CursorId(u64);

impl CursorId {
    pub fn get(self) -> u64 {
        self.0
    }
}

/// An id-keyed collection of cursors.
#[derive(Debug, Default)]
pub struct Cursors {
    next_id: u64,
    cursors: HashMap<CursorId, Cursor>,
}

impl Cursors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `cursor` under a fresh id, strictly greater than any issued before.
    pub fn add(&mut self, cursor: Cursor) -> CursorId {
        self.next_id += 1;
        let id = CursorId(self.next_id);
        self.cursors.insert(id, cursor);
        id
    }

    /// Remove a cursor. Unknown ids are ignored.
    pub fn remove(&mut self, id: CursorId) -> Option<Cursor> {
        self.cursors.remove(&id)
    }

    /// Remove every cursor. Ids already issued stay retired.
    pub fn remove_all(&mut self) {
        self.cursors.clear();
    }

    pub fn get(&self, id: CursorId) -> Option<&Cursor> {
        self.cursors.get(&id)
    }

    pub fn get_mut(&mut self, id: CursorId) -> Option<&mut Cursor> {
        self.cursors.get_mut(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (CursorId, &Cursor)> {
        self.cursors.iter().map(|(id, c)| (*id, c))
    }

    pub fn len(&self) -> usize {
        self.cursors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cursors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn under(column: usize, row: usize) -> Cursor {
        Cursor::new(column, row, Color::WHITE, CursorType::Under)
    }

    // ── Ids ─────────────────────────────────────────────────────────

    #[test]
    fn first_id_is_one() {
        let mut cursors = Cursors::new();
        assert_eq!(cursors.add(under(0, 0)).get(), 1);
    }

    #[test]
    fn identical_cursors_get_distinct_ids() {
        let mut cursors = Cursors::new();
        let a = cursors.add(under(3, 4));
        let b = cursors.add(under(3, 4));
        assert_ne!(a, b);
        assert_eq!(cursors.len(), 2);
    }

    #[test]
    fn ids_are_not_reused_after_remove() {
        let mut cursors = Cursors::new();
        let a = cursors.add(under(0, 0));
        cursors.remove(a);
        let b = cursors.add(under(0, 0));
        assert!(b > a);
    }

    #[test]
    fn ids_keep_increasing_after_remove_all() {
        let mut cursors = Cursors::new();
        let issued: Vec<CursorId> = (0..5).map(|i| cursors.add(under(i, 0))).collect();
        cursors.remove_all();
        assert!(cursors.is_empty());
        let next = cursors.add(under(0, 0));
        assert!(issued.iter().all(|id| next > *id));
    }

    // ── Remove ──────────────────────────────────────────────────────

    #[test]
    fn remove_returns_the_cursor() {
        let mut cursors = Cursors::new();
        let id = cursors.add(under(2, 1));
        assert_eq!(cursors.remove(id), Some(under(2, 1)));
        assert!(cursors.get(id).is_none());
    }

    #[test]
    fn remove_unknown_id_is_a_no_op() {
        let mut cursors = Cursors::new();
        let id = cursors.add(under(0, 0));
        cursors.remove(id);
        assert_eq!(cursors.remove(id), None);
        assert_eq!(cursors.remove(CursorId(999)), None);
        assert!(cursors.is_empty());
    }

    // ── Mutation ────────────────────────────────────────────────────

    #[test]
    fn get_mut_updates_in_place() {
        let mut cursors = Cursors::new();
        let id = cursors.add(under(0, 0));
        cursors.get_mut(id).unwrap().visible = false;
        assert!(!cursors.get(id).unwrap().visible);
    }

    #[test]
    fn iter_visits_every_cursor() {
        let mut cursors = Cursors::new();
        let a = cursors.add(under(0, 0));
        let b = cursors.add(under(1, 0));
        let mut ids: Vec<CursorId> = cursors.iter().map(|(id, _)| id).collect();
        ids.sort();
        assert_eq!(ids, vec![a, b]);
    }

    // ── Rendering helpers ───────────────────────────────────────────

    #[rstest]
    #[case(CursorType::Block, true, 10, 5, Some(32))]
    #[case(CursorType::Block, false, 10, 5, None)]
    #[case(CursorType::Under, true, 10, 5, None)]
    #[case(CursorType::Block, true, 2, 5, None)]
    #[case(CursorType::Block, true, 10, 3, None)]
    fn block_cursor_inverts_only_its_visible_cell(
        #[case] cursor_type: CursorType,
        #[case] visible: bool,
        #[case] columns: usize,
        #[case] rows: usize,
        #[case] expected: Option<usize>,
    ) {
        let mut cursor = Cursor::new(2, 3, Color::WHITE, cursor_type);
        cursor.visible = visible;
        assert_eq!(cursor.inverted_cell(columns, rows), expected);
    }

    #[rstest]
    #[case(20.0, 2.0)]
    #[case(16.0, 2.0)]
    #[case(8.0, 1.0)]
    #[case(3.0, 1.0)]
    fn underline_is_at_least_one_pixel(#[case] cell_height: f32, #[case] expected: f32) {
        assert_eq!(underline_thickness(cell_height), expected);
    }

    #[test]
    fn new_cursor_is_visible() {
        assert!(under(0, 0).visible);
    }
}
