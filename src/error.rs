//! Error types for the chat server
//!
//! Defines server-level errors and per-peer send errors.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Server-level errors
///
/// `Bind` stops startup, `InvariantViolation` flags a programming error,
/// and `Io` covers failures of the readiness machinery itself.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The listening socket could not be bound (fatal)
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Internal contract broken by the caller (fatal)
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Message send errors
///
/// Occurs when writing to a single peer. Never aborts a broadcast.
#[derive(Debug, Error)]
pub enum SendError {
    /// The target connection has already been closed
    #[error("connection closed")]
    ConnectionClosed,

    /// The peer is not reading and its outbound queue is full
    #[error("outbound queue full")]
    Overflow,

    /// The socket write failed
    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),
}
