//! Message sinks.
//!
//! A sink receives the finished text plus the caller's context handle and
//! decides what emission means: a platform log, a managed-runtime print
//! callback, a test buffer.

use std::sync::Mutex;
use tracing::Level;

/// Consumes a fully formed message.
pub trait Sink<C: ?Sized> {
    fn emit(&self, context: &C, message: &str);
}

impl<C, F> Sink<C> for F
where
    C: ?Sized,
    F: Fn(&C, &str),
{
    fn emit(&self, context: &C, message: &str) {
        self(context, message)
    }
}

/// Forwards messages to `tracing` at a fixed level.
///
/// The context handle is attached as a `context` field.
#[derive(Debug, Clone, Copy)]
pub struct TracingSink {
    level: Level,
}

impl TracingSink {
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    pub fn level(&self) -> Level {
        self.level
    }
}

impl Default for TracingSink {
    fn default() -> Self {
        Self::new(Level::INFO)
    }
}

impl<C: std::fmt::Debug + ?Sized> Sink<C> for TracingSink {
    fn emit(&self, context: &C, message: &str) {
        // tracing needs the level at compile time.
        if self.level == Level::ERROR {
            tracing::error!(target: "wvbridge::message", context = ?context, "{message}");
        } else if self.level == Level::WARN {
            tracing::warn!(target: "wvbridge::message", context = ?context, "{message}");
        } else if self.level == Level::INFO {
            tracing::info!(target: "wvbridge::message", context = ?context, "{message}");
        } else if self.level == Level::DEBUG {
            tracing::debug!(target: "wvbridge::message", context = ?context, "{message}");
        } else {
            tracing::trace!(target: "wvbridge::message", context = ?context, "{message}");
        }
    }
}

/// Buffers every message in memory, ignoring the context.
#[derive(Debug, Default)]
pub struct CollectSink {
    messages: Mutex<Vec<String>>,
}

impl CollectSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything received so far, oldest first.
    pub fn messages(&self) -> Vec<String> {
        self.lock().clone()
    }

    /// Take everything received so far, leaving the buffer empty.
    pub fn drain(&self) -> Vec<String> {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        // A panicking sink user cannot leave the Vec half-updated.
        self.messages
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl<C: ?Sized> Sink<C> for CollectSink {
    fn emit(&self, _context: &C, message: &str) {
        self.lock().push(message.to_string());
    }
}
