//! Registry of connected users
//!
//! Maps each live connection to its `User`. Broadcast and private sends go
//! through here so a failed write to one peer never affects the others.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::error::{ChatError, SendError};
use crate::names::{NameRegistry, NameSource};
use crate::server::Connection;
use crate::types::ConnectionId;
use crate::user::User;

/// All users currently in the chat, keyed by connection
///
/// Ordered by `ConnectionId`, which is the order users joined in.
#[derive(Debug, Default)]
pub struct UserRegistry {
    users: BTreeMap<ConnectionId, User>,
}

impl UserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the user for `conn`, creating it on first use
    pub fn get_or_create<S: NameSource>(
        &mut self,
        conn: &Connection,
        names: &mut NameRegistry<S>,
    ) -> &User {
        self.users.entry(conn.id()).or_insert_with(|| {
            let user = User::new(conn, names.allocate());
            debug!("Created user {} for connection {}", user.name, conn.id());
            user
        })
    }

    /// Create the user for `conn`
    ///
    /// Fails without allocating a name if the connection already has a user.
    pub fn create<S: NameSource>(
        &mut self,
        conn: &Connection,
        names: &mut NameRegistry<S>,
    ) -> Result<&User, ChatError> {
        if self.users.contains_key(&conn.id()) {
            return Err(ChatError::InvariantViolation(format!(
                "connection {} already has a user",
                conn.id()
            )));
        }
        Ok(self.get_or_create(conn, names))
    }

    /// Remove and return the user for `id`
    ///
    /// The caller releases the user's name.
    pub fn remove(&mut self, id: ConnectionId) -> Option<User> {
        self.users.remove(&id)
    }

    pub fn get(&self, id: ConnectionId) -> Option<&User> {
        self.users.get(&id)
    }

    /// Write `bytes` to every user except `exclude`
    ///
    /// Returns the number of users the bytes were delivered to.
    pub fn broadcast_except(&self, exclude: ConnectionId, bytes: &[u8]) -> usize {
        let mut delivered = 0;
        for (id, user) in &self.users {
            if *id == exclude {
                continue;
            }
            match user.send(bytes) {
                Ok(()) => delivered += 1,
                Err(e) => warn!("Failed to deliver to {} ({}): {}", user.name, id, e),
            }
        }
        delivered
    }

    /// Write `bytes` to a single user
    ///
    /// Returns false if the user is unknown or the write failed.
    pub fn send_to(&self, id: ConnectionId, bytes: &[u8]) -> bool {
        let result = match self.users.get(&id) {
            Some(user) => user.send(bytes),
            None => Err(SendError::ConnectionClosed),
        };
        match result {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to send to {}: {}", id, e);
                false
            }
        }
    }

    /// Copy of the current users in join order
    pub fn snapshot(&self) -> Vec<User> {
        self.users.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;
    use std::net::TcpStream as StdTcpStream;
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::server::test_support::connection_pair;

    /// Whatever `remote` receives within a short window
    fn drain(remote: &mut StdTcpStream) -> Vec<u8> {
        remote
            .set_read_timeout(Some(Duration::from_millis(100)))
            .unwrap();
        let mut out = Vec::new();
        let mut buf = [0u8; 256];
        loop {
            match remote.read(&mut buf) {
                Ok(0) | Err(_) => return out,
                Ok(n) => out.extend_from_slice(&buf[..n]),
            }
        }
    }

    #[test]
    fn test_get_or_create_is_idempotent() {
        let mut names = NameRegistry::new();
        let mut users = UserRegistry::new();
        let (conn, _remote) = connection_pair(2);

        let first = users.get_or_create(&conn, &mut names).clone();
        let second = users.get_or_create(&conn, &mut names).clone();

        assert_eq!(first.name, second.name);
        assert_eq!(users.len(), 1);
        assert_eq!(names.len(), 1);
    }

    #[test]
    fn test_create_twice_is_invariant_violation() {
        let mut names = NameRegistry::new();
        let mut users = UserRegistry::new();
        let (conn, _remote) = connection_pair(2);

        users.create(&conn, &mut names).unwrap();
        let err = users.create(&conn, &mut names).unwrap_err();

        assert!(matches!(err, ChatError::InvariantViolation(_)));
        assert_eq!(names.len(), 1);
    }

    #[test]
    fn test_remove_does_not_release_name() {
        let mut names = NameRegistry::new();
        let mut users = UserRegistry::new();
        let (conn, _remote) = connection_pair(2);
        let name = users.get_or_create(&conn, &mut names).name.clone();

        let removed = users.remove(conn.id()).unwrap();
        assert_eq!(removed.name, name);
        assert!(users.remove(conn.id()).is_none());
        assert!(users.is_empty());

        // Name stays allocated until the caller releases it
        assert!(names.contains(&name));
        assert!(names.release(&removed.name));
    }

    #[test]
    fn test_broadcast_except_skips_sender() {
        let mut names = NameRegistry::new();
        let mut users = UserRegistry::new();
        let (a, mut remote_a) = connection_pair(2);
        let (b, mut remote_b) = connection_pair(3);
        let (c, mut remote_c) = connection_pair(4);
        for conn in [&a, &b, &c] {
            users.get_or_create(conn, &mut names);
        }

        let delivered = users.broadcast_except(a.id(), b"ping\n");

        assert_eq!(delivered, 2);
        assert!(drain(&mut remote_a).is_empty());
        assert_eq!(drain(&mut remote_b), b"ping\n");
        assert_eq!(drain(&mut remote_c), b"ping\n");
    }

    #[test]
    fn test_broadcast_survives_closed_peer() {
        let mut names = NameRegistry::new();
        let mut users = UserRegistry::new();
        let (a, _remote_a) = connection_pair(2);
        let (b, _remote_b) = connection_pair(3);
        let (c, mut remote_c) = connection_pair(4);
        for conn in [&a, &b, &c] {
            users.get_or_create(conn, &mut names);
        }
        drop(b);

        let delivered = users.broadcast_except(a.id(), b"ping\n");

        assert_eq!(delivered, 1);
        assert_eq!(drain(&mut remote_c), b"ping\n");
    }

    #[test]
    fn test_slow_reader_only_sees_whole_frames() {
        let mut names = NameRegistry::new();
        let mut users = UserRegistry::new();
        let (a, _remote_a) = connection_pair(2);
        let (b, mut remote_b) = connection_pair(3);
        users.get_or_create(&a, &mut names);
        users.get_or_create(&b, &mut names);

        // Far more than the kernel buffers plus the outbound queue can hold
        let mut frame = vec![b'x'; 4000];
        frame.push(b'\n');
        let mut delivered = 0;
        for _ in 0..3000 {
            delivered += users.broadcast_except(a.id(), &frame);
        }
        assert!(delivered < 3000);
        assert!(b.pending_bytes() > 0);

        let reader = thread::spawn(move || {
            let mut received = Vec::new();
            remote_b.read_to_end(&mut received).unwrap();
            received
        });
        while b.pending_bytes() > 0 {
            b.flush().unwrap();
            thread::yield_now();
        }
        users.remove(b.id());
        drop(b);

        let received = reader.join().unwrap();
        assert_eq!(received.len(), delivered * frame.len());
        assert!(received.ends_with(b"\n"));
        for line in received[..received.len() - 1].split(|&byte| byte == b'\n') {
            assert_eq!(line.len(), 4000);
        }
    }

    #[test]
    fn test_send_to() {
        let mut names = NameRegistry::new();
        let mut users = UserRegistry::new();
        let (a, mut remote_a) = connection_pair(2);
        let (b, mut remote_b) = connection_pair(3);
        users.get_or_create(&a, &mut names);
        users.get_or_create(&b, &mut names);

        assert!(users.send_to(b.id(), b"psst\n"));
        assert!(!users.send_to(ConnectionId(99), b"psst\n"));

        assert!(drain(&mut remote_a).is_empty());
        assert_eq!(drain(&mut remote_b), b"psst\n");
    }

    #[test]
    fn test_send_to_removed_is_noop() {
        let mut names = NameRegistry::new();
        let mut users = UserRegistry::new();
        let (a, _remote_a) = connection_pair(2);
        users.get_or_create(&a, &mut names);
        users.remove(a.id());

        assert!(!users.send_to(a.id(), b"psst\n"));
    }

    #[test]
    fn test_snapshot_is_a_copy_in_join_order() {
        let mut names = NameRegistry::new();
        let mut users = UserRegistry::new();
        let (a, _remote_a) = connection_pair(3);
        let (b, _remote_b) = connection_pair(2);
        users.get_or_create(&a, &mut names);
        users.get_or_create(&b, &mut names);

        let snapshot = users.snapshot();
        users.remove(a.id());

        let ids: Vec<ConnectionId> = snapshot.iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![b.id(), a.id()]);
        assert_eq!(users.len(), 1);
    }
}
