//! Main-thread dispatch.
//!
//! A [`Dispatcher`] guarantees that work runs on one privileged thread
//! (usually the UI thread) no matter which thread submits it. [`MainLoop`]
//! is the in-process implementation; platform facilities such as an OS
//! main queue plug in by implementing the trait.

pub mod main_loop;

pub use main_loop::{MainLoop, Runner};

use crate::error::Result;
use crate::model::Work;
use std::sync::Arc;

/// Runs work items on a designated privileged thread.
pub trait Dispatcher: Send + Sync {
    /// Is the calling thread the privileged thread right now?
    fn is_privileged(&self) -> bool;

    /// Run `work` on the privileged thread and wait for it to finish.
    ///
    /// Called from the privileged thread, `work` runs in place. A panic in
    /// `work` resumes on the calling thread.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueueClosed`](crate::error::Error::QueueClosed) if
    /// the run queue went away before `work` completed.
    fn run_sync(&self, work: Work) -> Result<()>;

    /// Run `work` on the privileged thread without waiting.
    ///
    /// Called from the privileged thread, `work` runs in place before this
    /// returns. If the run queue is gone the work is dropped.
    fn run_async(&self, work: Work);
}

impl<D: Dispatcher + ?Sized> Dispatcher for Arc<D> {
    fn is_privileged(&self) -> bool {
        (**self).is_privileged()
    }

    fn run_sync(&self, work: Work) -> Result<()> {
        (**self).run_sync(work)
    }

    fn run_async(&self, work: Work) {
        (**self).run_async(work)
    }
}
