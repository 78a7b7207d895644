// Owner-thread task queue: other threads submit closures, the render loop runs them
// in submission order before drawing.

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};

use super::DisplayState;

/// A unit of work run on the owner thread with exclusive access to display state.
pub type Task = Box<dyn FnOnce(&mut DisplayState) + Send>;

type Waker = Arc<dyn Fn() + Send + Sync>;

/// Returned when the owning window has closed and tasks can no longer run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("display task queue is closed")]
    Closed,
}

/// The consuming end, owned by the render loop.
pub struct TaskQueue {
    tx: Sender<Task>,
    rx: Receiver<Task>,
    waker: Option<Waker>,
}

impl TaskQueue {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self { tx, rx, waker: None }
    }

    /// `waker` runs after every submission, to schedule a drain on the owner thread.
    pub fn with_waker(waker: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            waker: Some(Arc::new(waker)),
            ..Self::new()
        }
    }

    pub fn submitter(&self) -> Submitter {
        Submitter {
            tx: self.tx.clone(),
            waker: self.waker.clone(),
        }
    }

    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    /// Run every task queued before this call, oldest first, each to completion.
    /// Tasks submitted while draining wait for the next drain. Returns the number run.
    pub fn drain(&self, state: &mut DisplayState) -> usize {
        let queued = self.rx.len();
        let mut ran = 0;
        for task in self.rx.try_iter().take(queued) {
            task(state);
            ran += 1;
        }
        ran
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable handle for queueing work from any thread.
#[derive(Clone)]
pub struct Submitter {
    tx: Sender<Task>,
    waker: Option<Waker>,
}

impl Submitter {
    /// Queue `task` to run on the owner thread before the next frame.
    pub fn submit<F>(&self, task: F) -> Result<(), SubmitError>
    where
        F: FnOnce(&mut DisplayState) + Send + 'static,
    {
        self.tx.send(Box::new(task)).map_err(|_| SubmitError::Closed)?;
        if let Some(wake) = &self.waker {
            wake();
        }
        Ok(())
    }
}
