//! User struct definition
//!
//! Represents a connected chat participant: the name it was given, the
//! address it connected from, and a non-owning handle to its socket.

use std::net::SocketAddr;
use std::rc::Weak;

use crate::error::SendError;
use crate::server::Connection;
use crate::stream::PeerStream;
use crate::types::ConnectionId;

/// Connected user information
///
/// The socket itself belongs to the multiplexer. A user only holds a weak
/// handle, so writing to a user whose connection is gone fails with
/// `SendError::ConnectionClosed` instead of touching a closed socket.
#[derive(Debug, Clone)]
pub struct User {
    /// Connection this user is bound to
    pub id: ConnectionId,
    /// Unique display name
    pub name: String,
    /// Remote address, captured at creation
    pub addr: SocketAddr,
    stream: Weak<PeerStream>,
}

impl User {
    /// Create a user bound to `conn`
    pub fn new(conn: &Connection, name: String) -> Self {
        Self {
            id: conn.id(),
            name,
            addr: conn.peer_addr(),
            stream: conn.downgrade(),
        }
    }

    /// Send `bytes` to this user as one frame
    ///
    /// What the socket cannot take right away is queued behind earlier frames.
    pub fn send(&self, bytes: &[u8]) -> Result<(), SendError> {
        let stream = self.stream.upgrade().ok_or(SendError::ConnectionClosed)?;
        stream.send(bytes)
    }

    /// Whether the underlying connection is still open
    pub fn is_connected(&self) -> bool {
        self.stream.strong_count() > 0
    }
}

impl std::fmt::Display for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}
