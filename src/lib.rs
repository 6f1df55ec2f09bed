//! # wvbridge
//!
//! Glue for native code living between a managed runtime and a GUI toolkit.
//!
//! Provides main-thread dispatch (run work on the privileged UI thread,
//! blocking or fire-and-forget) and variadic message marshaling into an
//! external diagnostic sink, plus tracing/OpenTelemetry observability.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod message;
pub mod model;
pub mod telemetry;
