//! Variadic message marshaling.
//!
//! Any run of [`Display`] values is concatenated, in order and without
//! separators, into one owned string and handed once to a [`Sink`] together
//! with an opaque context handle. No filtering, truncation or escaping
//! happens here; that is the sink's business.
//!
//! ```
//! use wvbridge::emit;
//! use wvbridge::message::CollectSink;
//!
//! let sink = CollectSink::new();
//! emit!(&sink, &(), "count=", 3, " ok=", true);
//! assert_eq!(sink.messages(), vec!["count=3 ok=true".to_string()]);
//! ```

pub mod sink;

pub use sink::{CollectSink, Sink, TracingSink};

use crate::telemetry::metrics;
use std::fmt::{self, Display, Write as _};

/// Concatenate the text of every argument, in order.
pub fn format_message(args: &[&dyn Display]) -> String {
    Message::from_args(args).into_string()
}

/// Format `args` and deliver the result to `sink` exactly once.
///
/// Zero arguments deliver an empty string.
pub fn format_and_emit<C, S>(context: &C, sink: &S, args: &[&dyn Display])
where
    C: ?Sized,
    S: Sink<C> + ?Sized,
{
    Message::from_args(args).emit(context, sink);
}

/// A message under construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    buf: String,
}

impl Message {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_args(args: &[&dyn Display]) -> Self {
        let mut msg = Self::new();
        for arg in args {
            msg.append(arg);
        }
        msg
    }

    /// Append one value's text. Builder form.
    pub fn push(mut self, value: impl Display) -> Self {
        self.append(value);
        self
    }

    /// Append one value's text in place.
    pub fn append(&mut self, value: impl Display) -> &mut Self {
        // Writing into a String only fails if the Display impl itself errors;
        // whatever it wrote before failing is kept.
        let _ = write!(self.buf, "{value}");
        self
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_string(self) -> String {
        self.buf
    }

    /// Hand the finished text to `sink`.
    pub fn emit<C, S>(self, context: &C, sink: &S)
    where
        C: ?Sized,
        S: Sink<C> + ?Sized,
    {
        sink.emit(context, &self.buf);
        metrics::message_emitted().add(1, &[]);
    }
}

impl Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.buf)
    }
}

impl From<Message> for String {
    fn from(msg: Message) -> Self {
        msg.buf
    }
}

/// Concatenate any number of displayable values into a `String`.
///
/// `message!("count=", 3)` yields `"count=3"`.
#[macro_export]
macro_rules! message {
    ($($arg:expr),* $(,)?) => {
        $crate::message::format_message(&[$(&$arg as &dyn ::std::fmt::Display),*])
    };
}

/// Format any number of displayable values and deliver them to a sink.
///
/// `emit!(&sink, &context, "count=", 3, " ok=", true)` calls the sink once
/// with `"count=3 ok=true"`. Both `sink` and `context` are taken by reference.
#[macro_export]
macro_rules! emit {
    ($sink:expr, $context:expr $(, $arg:expr)* $(,)?) => {
        $crate::message::format_and_emit(
            $context,
            $sink,
            &[$(&$arg as &dyn ::std::fmt::Display),*],
        )
    };
}
