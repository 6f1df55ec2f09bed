//! Core data model.
//!
//! A work item is a deferred, zero-argument closure submitted for execution on
//! the privileged thread. It has no identity beyond a single dispatch; the
//! [`WorkId`] exists only so traces can correlate submit and execution.

use uuid::Uuid;

// ---------------------------------------------------------------------------
// Work
// ---------------------------------------------------------------------------

/// A boxed unit of work. Executed at most once.
pub type Work = Box<dyn FnOnce() + Send + 'static>;

/// Correlates one dispatch across threads in traces. Random per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkId(pub Uuid);

impl WorkId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WorkId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WorkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Leading 32 bits, same digits as the hyphenated form starts with.
        write!(f, "{:08x}", self.0.as_u128() >> 96)
    }
}

// ---------------------------------------------------------------------------
// Dispatch mode / path
// ---------------------------------------------------------------------------

/// How the caller asked for the work to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchMode {
    /// Caller waits for completion.
    Sync,
    /// Caller does not wait.
    Async,
}

/// How the work actually reached the privileged thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchPath {
    /// Caller was already on the privileged thread; ran in place.
    Inline,
    /// Handed to the run queue.
    Queued,
    /// Queue was closed; the work was dropped unexecuted.
    Dropped,
}

impl DispatchMode {
    pub fn as_str(self) -> &'static str {
        match self {
            DispatchMode::Sync => "sync",
            DispatchMode::Async => "async",
        }
    }
}

impl DispatchPath {
    pub fn as_str(self) -> &'static str {
        match self {
            DispatchPath::Inline => "inline",
            DispatchPath::Queued => "queued",
            DispatchPath::Dropped => "dropped",
        }
    }
}

impl std::fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::fmt::Display for DispatchPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
