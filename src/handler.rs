//! Chat protocol handler
//!
//! The policy bound to the multiplexer: greets and announces new users,
//! relays whatever a user sends to everyone else, and announces departures.
//!
//! Per connection the handler moves through `Connecting -> Active -> Closed`.
//! A connection is Active once it has an entry in the user registry; it is
//! Closed once the multiplexer has unregistered it and the entry is removed.

use tracing::{debug, info, warn};

use crate::error::ChatError;
use crate::message::{self, CONNECTED, DISCONNECTED};
use crate::names::{FirstNames, NameRegistry, NameSource};
use crate::registry::UserRegistry;
use crate::server::{Connection, EventHandler};
use crate::types::{ConnectionId, READ_BUFFER_SIZE};

/// Chat policy layer
///
/// Owns the single name registry of the process and the user registry.
pub struct ChatHandler<S = FirstNames> {
    users: UserRegistry,
    names: NameRegistry<S>,
}

impl ChatHandler<FirstNames> {
    pub fn new() -> Self {
        Self::with_names(NameRegistry::new())
    }
}

impl Default for ChatHandler<FirstNames> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: NameSource> ChatHandler<S> {
    /// Create a handler allocating names from `names`
    pub fn with_names(names: NameRegistry<S>) -> Self {
        Self {
            users: UserRegistry::new(),
            names,
        }
    }

    pub fn users(&self) -> &UserRegistry {
        &self.users
    }

    pub fn names(&self) -> &NameRegistry<S> {
        &self.names
    }
}

impl<S: NameSource> EventHandler for ChatHandler<S> {
    /// Create the user, announce it, and tell it who else is here
    fn on_connect(&mut self, conn: &Connection) -> Result<(), ChatError> {
        let user = self.users.create(conn, &mut self.names)?.clone();
        info!("User {} joined from {}", user.name, user.addr);

        let joined =
            message::server_notice(&message::user_message(user.addr, &user.name, CONNECTED));
        self.users.broadcast_except(user.id, &message::frame(&joined));

        let others = self.users.snapshot();
        let roster = message::roster(
            others
                .iter()
                .filter(|other| other.id != user.id)
                .map(|other| other.name.as_str()),
        );
        self.users
            .send_to(user.id, &message::frame(&message::server_notice(&roster)));

        debug!("Users online: {}", self.users.len());
        Ok(())
    }

    /// Read once and relay the bytes to everyone else
    fn on_data(&mut self, conn: &Connection) -> Result<(), ChatError> {
        let user = self.users.get_or_create(conn, &mut self.names).clone();

        let mut buf = [0u8; READ_BUFFER_SIZE];
        let n = match conn.read(&mut buf) {
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return Ok(()),
            Err(e) => {
                // The next classification reports the connection as closed
                warn!("Read from {} failed: {}", user.name, e);
                return Ok(());
            }
        };
        if n == 0 {
            return Ok(());
        }

        let text = String::from_utf8_lossy(&buf[..n]);
        debug!("{} sent {} bytes", user.name, n);

        let line = message::user_message(user.addr, &user.name, &text);
        self.users.broadcast_except(user.id, &message::frame(&line));
        Ok(())
    }

    /// Drop the user, free its name, and announce the departure
    fn on_close(&mut self, id: ConnectionId) -> Result<(), ChatError> {
        let Some(user) = self.users.remove(id) else {
            warn!("Connection {} closed without a user", id);
            return Ok(());
        };

        if !self.names.release(&user.name) {
            warn!("Name {} was not allocated", user.name);
        }
        info!("User {} left", user.name);

        let left =
            message::server_notice(&message::user_message(user.addr, &user.name, DISCONNECTED));
        self.users.broadcast_except(id, &message::frame(&left));

        debug!("Users online: {}", self.users.len());
        Ok(())
    }
}
