//! Metric instrument factories for wvbridge.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! Without a provider these are no-ops.

use opentelemetry::metrics::{Counter, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("wvbridge")
}

/// Counter: work items dispatched.
/// Labels: `mode` ("sync" | "async"), `path` ("inline" | "queued" | "dropped").
pub fn dispatch_submitted() -> Counter<u64> {
    meter()
        .u64_counter("wvbridge.dispatch.submitted")
        .with_description("Number of work items dispatched to the main thread")
        .build()
}

/// Counter: work items dropped because the run queue was closed.
/// Labels: `mode`.
pub fn dispatch_dropped() -> Counter<u64> {
    meter()
        .u64_counter("wvbridge.dispatch.dropped")
        .with_description("Work items dropped on a closed main loop")
        .build()
}

/// Counter: messages handed to a sink.
pub fn message_emitted() -> Counter<u64> {
    meter()
        .u64_counter("wvbridge.message.emitted")
        .with_description("Number of formatted messages delivered to a sink")
        .build()
}
