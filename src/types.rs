//! Basic type definitions for the chat server
//!
//! Provides the `ConnectionId` newtype and the protocol constants shared by
//! the server and the client.

use mio::Token;

/// Default address for both the server and the client
pub const DEFAULT_ADDR: &str = "localhost:5555";

/// Maximum bytes consumed from a client socket per readable event
pub const READ_BUFFER_SIZE: usize = 4096;

/// Chunk size the interactive client reads from the server
pub const CLIENT_READ_BUFFER_SIZE: usize = 1024;

/// Most bytes queued for a peer that is not reading; further frames to it are dropped
pub const MAX_OUTBOUND_BYTES: usize = 1024 * 1024;

/// Connection identifier (newtype pattern)
///
/// Wraps the readiness token a socket is registered under. Ids are handed
/// out from a monotonically increasing counter, so an id is never reused
/// while its connection is still registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(pub usize);

impl ConnectionId {
    /// Reserved id of the listening socket
    pub const LISTENER: ConnectionId = ConnectionId(0);

    /// Reserved id of the shutdown waker
    pub(crate) const WAKER: ConnectionId = ConnectionId(1);

    /// First id handed out to accepted connections
    pub(crate) const FIRST_PEER: usize = 2;

    pub fn token(self) -> Token {
        Token(self.0)
    }

    pub fn is_listener(self) -> bool {
        self == Self::LISTENER
    }
}

impl From<Token> for ConnectionId {
    fn from(token: Token) -> Self {
        Self(token.0)
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}
