//! Error types for wvbridge.
//!
//! Panics raised inside dispatched work are never converted into these;
//! they travel through the host's own unwinding.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("main loop queue is closed")]
    QueueClosed,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
