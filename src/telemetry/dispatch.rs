//! Dispatch span helpers.
//!
//! One span per dispatch call, entered again on the privileged thread while
//! the work runs, so submit and execution show up under the same span.

use opentelemetry::KeyValue;
use tracing::Span;

use super::metrics;
use crate::model::{DispatchMode, DispatchPath, WorkId};

/// Start a span for one dispatch.
///
/// The `dispatch.path` field is declared empty and filled by
/// [`record_dispatch_path`] once the route is known.
pub fn start_dispatch_span(mode: DispatchMode, id: &WorkId) -> Span {
    tracing::debug_span!(
        "dispatch",
        "dispatch.mode" = mode.as_str(),
        "dispatch.id" = %id,
        "dispatch.path" = tracing::field::Empty,
    )
}

/// Record how the work travelled and count it.
pub fn record_dispatch_path(span: &Span, mode: DispatchMode, path: DispatchPath) {
    span.record("dispatch.path", path.as_str());
    metrics::dispatch_submitted().add(
        1,
        &[
            KeyValue::new("mode", mode.as_str()),
            KeyValue::new("path", path.as_str()),
        ],
    );
    if path == DispatchPath::Dropped {
        metrics::dispatch_dropped().add(1, &[KeyValue::new("mode", mode.as_str())]);
    }
}
