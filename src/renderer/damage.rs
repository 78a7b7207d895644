use std::ops::Range;

/// Per-row dirty flags for the cell grid's instance buffer.
///
/// The compositor marks rows whose instances changed; the renderer uploads only
/// those rows, coalesced into contiguous spans.
#[derive(Debug, Clone)]
pub struct DamageTracker {
    dirty: Vec<bool>,
}

impl DamageTracker {
    /// Track `rows` rows, all initially clean.
    pub fn new(rows: usize) -> Self {
        Self {
            dirty: vec![false; rows],
        }
    }

    /// Out-of-bounds rows are ignored.
    pub fn mark_row_dirty(&mut self, row: usize) {
        if let Some(flag) = self.dirty.get_mut(row) {
            *flag = true;
        }
    }

    pub fn dirty_rows(&self) -> impl Iterator<Item = usize> + '_ {
        self.dirty
            .iter()
            .enumerate()
            .filter_map(|(i, &dirty)| dirty.then_some(i))
    }

    /// Dirty rows merged into maximal runs of consecutive rows.
    pub fn dirty_spans(&self) -> Vec<Range<usize>> {
        let mut spans: Vec<Range<usize>> = Vec::new();
        for row in self.dirty_rows() {
            match spans.last_mut() {
                Some(span) if span.end == row => span.end = row + 1,
                _ => spans.push(row..row + 1),
            }
        }
        spans
    }

    pub fn clear(&mut self) {
        self.dirty.fill(false);
    }

    /// Track a new row count. Every row is dirty afterwards, since the cells
    /// behind them were replaced.
    pub fn resize(&mut self, rows: usize) {
        self.dirty = vec![true; rows];
    }
}
