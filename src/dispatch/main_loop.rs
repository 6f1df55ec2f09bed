//! In-process main loop: a FIFO run queue drained by one privileged thread.
//!
//! [`MainLoop`] handles submit work; the single [`Runner`] drains the queue on
//! the thread it was created on. That thread is the privileged one from the
//! moment the loop exists, before the runner starts draining.

use crate::error::{Error, Result};
use crate::model::{DispatchMode, DispatchPath, Work, WorkId};
use crate::telemetry::dispatch::{record_dispatch_path, start_dispatch_span};
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle, ThreadId};
use tokio::sync::{mpsc, oneshot};
use tracing::{Span, debug, error, info};

use super::Dispatcher;

/// Completion signal for a blocking dispatch. Carries the panic payload, if any.
type Completion = thread::Result<()>;

enum Command {
    Run {
        id: WorkId,
        work: Work,
        span: Span,
        done: Option<oneshot::Sender<Completion>>,
    },
    Shutdown,
}

struct Shared {
    /// Set once, when the privileged thread is known.
    thread: OnceLock<ThreadId>,
    /// Set by `shutdown()` or when the runner goes away. No new work runs after.
    closing: AtomicBool,
}

impl Shared {
    fn new() -> Self {
        Self {
            thread: OnceLock::new(),
            closing: AtomicBool::new(false),
        }
    }

    fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }
}

/// Handle to a main loop. Cheap to clone; all clones share one queue.
#[derive(Clone)]
pub struct MainLoop {
    tx: mpsc::UnboundedSender<Command>,
    shared: Arc<Shared>,
}

/// The draining side of a [`MainLoop`]. Exactly one exists per loop.
///
/// Not `Send`: it stays on the thread that is already privileged.
pub struct Runner {
    rx: mpsc::UnboundedReceiver<Command>,
    shared: Arc<Shared>,
    _bound: PhantomData<*const ()>,
}

impl std::fmt::Debug for MainLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MainLoop")
            .field("thread", &self.shared.thread.get())
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl MainLoop {
    /// Create a loop whose privileged thread is the calling thread.
    ///
    /// Use this when the privileged thread already exists, e.g. the process
    /// main thread of a GUI host. Work dispatched from this thread before
    /// [`Runner::run`] starts runs in place; work from other threads waits
    /// in the queue.
    pub fn new() -> (Self, Runner) {
        let (handle, rx) = Self::unbound();
        let _ = handle.shared.thread.set(thread::current().id());
        let runner = Runner::new(rx, Arc::clone(&handle.shared));
        (handle, runner)
    }

    /// Spawn a dedicated, named OS thread and make it the privileged thread.
    pub fn spawn(name: &str) -> Result<(Self, JoinHandle<()>)> {
        let (handle, rx) = Self::unbound();
        let shared = Arc::clone(&handle.shared);
        let join = thread::Builder::new().name(name.to_string()).spawn(move || {
            let _ = shared.thread.set(thread::current().id());
            Runner::new(rx, shared).run()
        })?;
        // Known before the runner starts, so early callers see it too.
        let _ = handle.shared.thread.set(join.thread().id());
        Ok((handle, join))
    }

    fn unbound() -> (Self, mpsc::UnboundedReceiver<Command>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = Self {
            tx,
            shared: Arc::new(Shared::new()),
        };
        (handle, rx)
    }

    /// The privileged thread, once known.
    pub fn thread_id(&self) -> Option<ThreadId> {
        self.shared.thread.get().copied()
    }

    /// Is the calling thread the privileged thread?
    pub fn is_privileged(&self) -> bool {
        self.shared
            .thread
            .get()
            .is_some_and(|id| *id == thread::current().id())
    }

    /// True once the runner has stopped and nothing more will execute.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// True once `shutdown()` was called or the runner went away.
    pub fn is_closing(&self) -> bool {
        self.shared.is_closing()
    }

    /// Ask the loop to stop after the work already queued ahead of this call.
    ///
    /// Work submitted afterwards is dropped, including work that would
    /// otherwise run in place on the privileged thread.
    pub fn shutdown(&self) {
        self.shared.closing.store(true, Ordering::Release);
        if self.tx.send(Command::Shutdown).is_err() {
            debug!("shutdown requested on a closed main loop");
        }
    }

    /// Run `work` on the privileged thread, blocking until it has finished.
    ///
    /// # Panics
    ///
    /// Resumes any panic raised by `work`. Like every tokio blocking receive,
    /// panics if called from within an async execution context; use
    /// [`MainLoop::run_sync_async`] there.
    pub fn run_sync<F>(&self, work: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let id = WorkId::new();
        let span = start_dispatch_span(DispatchMode::Sync, &id);

        if self.shared.is_closing() {
            record_dispatch_path(&span, DispatchMode::Sync, DispatchPath::Dropped);
            return Err(Error::QueueClosed);
        }
        if self.is_privileged() {
            record_dispatch_path(&span, DispatchMode::Sync, DispatchPath::Inline);
            span.in_scope(work);
            return Ok(());
        }

        let done = self.submit_blocking(id, Box::new(work), &span)?;
        settle(done.blocking_recv())
    }

    /// Awaitable form of [`MainLoop::run_sync`] for callers on an async runtime.
    ///
    /// Dropping the future does not withdraw the work item.
    pub async fn run_sync_async<F>(&self, work: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let id = WorkId::new();
        let span = start_dispatch_span(DispatchMode::Sync, &id);

        if self.shared.is_closing() {
            record_dispatch_path(&span, DispatchMode::Sync, DispatchPath::Dropped);
            return Err(Error::QueueClosed);
        }
        if self.is_privileged() {
            record_dispatch_path(&span, DispatchMode::Sync, DispatchPath::Inline);
            span.in_scope(work);
            return Ok(());
        }

        let done = self.submit_blocking(id, Box::new(work), &span)?;
        settle(done.await)
    }

    /// Blocking dispatch of a closure that produces a value.
    pub fn run_sync_value<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (value_tx, mut value_rx) = oneshot::channel();
        self.run_sync(move || {
            let _ = value_tx.send(f());
        })?;
        value_rx.try_recv().map_err(|_| Error::QueueClosed)
    }

    /// Run `work` on the privileged thread without waiting for it.
    ///
    /// From the privileged thread itself this runs `work` in place before
    /// returning; there is no deferral when no thread hop is needed.
    pub fn run_async<F>(&self, work: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let id = WorkId::new();
        let span = start_dispatch_span(DispatchMode::Async, &id);

        if self.shared.is_closing() {
            record_dispatch_path(&span, DispatchMode::Async, DispatchPath::Dropped);
            span.in_scope(|| debug!("main loop closing, work dropped"));
            return;
        }
        if self.is_privileged() {
            record_dispatch_path(&span, DispatchMode::Async, DispatchPath::Inline);
            span.in_scope(work);
            return;
        }

        let command = Command::Run {
            id,
            work: Box::new(work),
            span: span.clone(),
            done: None,
        };
        match self.tx.send(command) {
            Ok(()) => record_dispatch_path(&span, DispatchMode::Async, DispatchPath::Queued),
            Err(_) => {
                record_dispatch_path(&span, DispatchMode::Async, DispatchPath::Dropped);
                span.in_scope(|| debug!("main loop queue closed, work dropped"));
            }
        }
    }

    fn submit_blocking(
        &self,
        id: WorkId,
        work: Work,
        span: &Span,
    ) -> Result<oneshot::Receiver<Completion>> {
        let (done_tx, done_rx) = oneshot::channel();
        let command = Command::Run {
            id,
            work,
            span: span.clone(),
            done: Some(done_tx),
        };
        if self.tx.send(command).is_err() {
            record_dispatch_path(span, DispatchMode::Sync, DispatchPath::Dropped);
            return Err(Error::QueueClosed);
        }
        record_dispatch_path(span, DispatchMode::Sync, DispatchPath::Queued);
        Ok(done_rx)
    }
}

/// Turn a completion signal into the caller's result, resuming any panic.
fn settle(received: std::result::Result<Completion, oneshot::error::RecvError>) -> Result<()> {
    match received {
        Ok(Ok(())) => Ok(()),
        Ok(Err(payload)) => panic::resume_unwind(payload),
        // Loop stopped (or died) with our item still queued.
        Err(_) => Err(Error::QueueClosed),
    }
}

impl Runner {
    fn new(rx: mpsc::UnboundedReceiver<Command>, shared: Arc<Shared>) -> Self {
        Self {
            rx,
            shared,
            _bound: PhantomData,
        }
    }

    /// Drain the queue on the privileged thread until shutdown or until
    /// every [`MainLoop`] handle has been dropped.
    ///
    /// A panic in fire-and-forget work unwinds out of this call and ends the
    /// loop; items still queued are dropped and blocked callers get
    /// [`Error::QueueClosed`].
    pub fn run(mut self) {
        let current = thread::current();
        info!(
            thread = current.name().unwrap_or("<unnamed>"),
            "main loop started"
        );

        while let Some(command) = self.rx.blocking_recv() {
            match command {
                Command::Run {
                    id,
                    work,
                    span,
                    done,
                } => {
                    let _entered = span.enter();
                    debug!(work.id = %id, "executing work");
                    match done {
                        Some(done) => {
                            let outcome = panic::catch_unwind(AssertUnwindSafe(work));
                            // The awaiting future was dropped; nobody is left to resume it.
                            if let Err(Err(payload)) = done.send(outcome) {
                                error!(
                                    work.id = %id,
                                    panic = panic_message(payload.as_ref()),
                                    "work panicked after its caller stopped waiting"
                                );
                            }
                        }
                        None => work(),
                    }
                }
                Command::Shutdown => {
                    info!("main loop shutting down");
                    return;
                }
            }
        }

        info!("all main loop handles dropped, main loop exiting");
    }
}

impl Drop for Runner {
    // Runs on return and on unwind alike.
    fn drop(&mut self) {
        self.shared.closing.store(true, Ordering::Release);
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic payload>")
}

impl Dispatcher for MainLoop {
    fn is_privileged(&self) -> bool {
        MainLoop::is_privileged(self)
    }

    fn run_sync(&self, work: Work) -> Result<()> {
        MainLoop::run_sync(self, work)
    }

    fn run_async(&self, work: Work) {
        MainLoop::run_async(self, work)
    }
}
