// Display state confined to the render loop's thread, and the queue other threads
// use to reach it.

pub mod queue;

pub use queue::{SubmitError, Submitter, Task, TaskQueue};

use std::time::Duration;

use crate::grid::CellGrid;
use crate::renderer::cursor::Cursors;

/// Everything a queued task may mutate: the cell grid, the cursor set, and the
/// window title. Owned by the render loop and never shared across threads.
pub struct DisplayState {
    grid: CellGrid,
    cursors: Cursors,
    last_render_duration: Duration,
    pending_title: Option<String>,
}

impl DisplayState {
    pub fn new(grid: CellGrid) -> Self {
        Self {
            grid,
            cursors: Cursors::new(),
            last_render_duration: Duration::ZERO,
            pending_title: None,
        }
    }

    pub fn grid(&self) -> &CellGrid {
        &self.grid
    }

    pub fn grid_mut(&mut self) -> &mut CellGrid {
        &mut self.grid
    }

    pub fn cursors(&self) -> &Cursors {
        &self.cursors
    }

    pub fn cursors_mut(&mut self) -> &mut Cursors {
        &mut self.cursors
    }

    /// Time spent building and submitting the last completed frame.
    pub fn last_render_duration(&self) -> Duration {
        self.last_render_duration
    }

    /// Change the window title once the current batch of tasks has run.
    pub fn set_title(&mut self, title: impl Into<String>) {
        self.pending_title = Some(title.into());
    }

    pub(crate) fn take_title(&mut self) -> Option<String> {
        self.pending_title.take()
    }

    pub(crate) fn record_render_duration(&mut self, duration: Duration) {
        self.last_render_duration = duration;
    }

    /// Split borrow for the compositor: the grid's dirty flags are cleared while
    /// cursors are only read.
    pub(crate) fn frame_parts(&mut self) -> (&mut CellGrid, &Cursors) {
        (&mut self.grid, &self.cursors)
    }
}
