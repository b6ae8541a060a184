//! Connection multiplexer
//!
//! The single blocking point of the server. A `mio::Poll` watches the
//! listening socket and every accepted connection; each readiness event is
//! classified and dispatched synchronously to an `EventHandler`.
//!
//! Every ready connection gets one turn per loop iteration: at most one
//! `on_data`, or its close. A connection that still holds bytes afterwards is
//! carried over to the next iteration, which polls without blocking, so one
//! busy peer cannot hold up accepts or other peers.
//!
//! A readable socket is ambiguous: it may hold data, or the peer may have
//! closed it. Every connection event is therefore classified with a
//! non-destructive peek before the handler is allowed to consume anything.

use std::collections::HashMap;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::time::Duration;

use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Waker};
use tracing::{debug, error, info, trace, warn};

use crate::error::ChatError;
use crate::stream::PeerStream;
use crate::types::ConnectionId;

/// Capacity of the readiness event buffer
const EVENTS_CAPACITY: usize = 256;

/// Poll timeout while a failed accept waits to be retried
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// What a readable connection turned out to hold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Bytes are waiting in the receive buffer
    Data,
    /// The peer closed (or reset) the connection; no more data will arrive
    Closed,
    /// Nothing to read right now
    Pending,
}

/// Classify a connection without consuming any of its bytes
pub fn classify(stream: &TcpStream) -> Readiness {
    let mut byte = [0u8; 1];
    loop {
        match stream.peek(&mut byte) {
            Ok(0) => return Readiness::Closed,
            Ok(_) => return Readiness::Data,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Readiness::Pending,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!("Peek failed, treating connection as closed: {}", e);
                return Readiness::Closed;
            }
        }
    }
}

/// An accepted client connection
///
/// Owned by the multiplexer while registered. Other components only get
/// weak handles to the socket via [`Connection::downgrade`].
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    stream: Rc<PeerStream>,
    peer: SocketAddr,
}

impl Connection {
    pub(crate) fn new(id: ConnectionId, stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            id,
            stream: Rc::new(PeerStream::new(stream)),
            peer,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Non-owning handle to the socket
    pub fn downgrade(&self) -> Weak<PeerStream> {
        Rc::downgrade(&self.stream)
    }

    /// Peek at the socket, see [`classify`]
    pub fn classify(&self) -> Readiness {
        classify(self.stream.get_ref())
    }

    /// Single non-blocking read into `buf`
    pub fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }

    /// Write out as much of the outbound queue as the socket takes
    pub fn flush(&self) -> io::Result<()> {
        self.stream.flush()
    }

    /// Bytes queued for this connection but not yet written
    pub fn pending_bytes(&self) -> usize {
        self.stream.pending_bytes()
    }
}

/// Callbacks invoked by [`ConnectionMultiplexer::run`]
///
/// All callbacks run on the multiplexer thread and must not block.
pub trait EventHandler {
    /// A connection was accepted and registered
    fn on_connect(&mut self, conn: &Connection) -> Result<(), ChatError>;

    /// `conn` has unread bytes. The handler is expected to consume some of
    /// them with a single read; if bytes remain, the connection gets another
    /// turn on the next loop iteration.
    fn on_data(&mut self, conn: &Connection) -> Result<(), ChatError>;

    /// The peer closed. The connection is already unregistered and its
    /// socket closed when this runs.
    fn on_close(&mut self, id: ConnectionId) -> Result<(), ChatError>;
}

/// Stops a running multiplexer from any thread
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    waker: Arc<Waker>,
}

impl ShutdownHandle {
    /// Make `run` return after the current batch of events
    pub fn shutdown(&self) -> io::Result<()> {
        self.waker.wake()
    }
}

/// Readiness-driven connection multiplexer
pub struct ConnectionMultiplexer {
    poll: Poll,
    waker: Arc<Waker>,
    listener: Option<TcpListener>,
    connections: HashMap<ConnectionId, Connection>,
    next_id: usize,
    retry_accept: bool,
}

impl ConnectionMultiplexer {
    pub fn new() -> io::Result<Self> {
        let poll = Poll::new()?;
        let waker = Arc::new(Waker::new(poll.registry(), ConnectionId::WAKER.token())?);
        Ok(Self {
            poll,
            waker,
            listener: None,
            connections: HashMap::new(),
            next_id: ConnectionId::FIRST_PEER,
            retry_accept: false,
        })
    }

    /// Bind the listening socket and watch it for incoming connections
    ///
    /// IPv4 addresses are preferred when `addr` resolves to several.
    /// Returns the bound address.
    pub fn listen(&mut self, addr: &str) -> Result<SocketAddr, ChatError> {
        if self.listener.is_some() {
            return Err(ChatError::InvariantViolation(
                "multiplexer is already listening".to_string(),
            ));
        }

        let bind_error = |source: io::Error| ChatError::Bind {
            addr: addr.to_string(),
            source,
        };

        let candidates: Vec<SocketAddr> = addr.to_socket_addrs().map_err(bind_error)?.collect();
        let socket_addr = candidates
            .iter()
            .find(|a| a.is_ipv4())
            .or_else(|| candidates.first())
            .copied()
            .ok_or_else(|| {
                bind_error(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "address resolved to nothing",
                ))
            })?;

        let mut listener = TcpListener::bind(socket_addr).map_err(bind_error)?;
        self.poll.registry().register(
            &mut listener,
            ConnectionId::LISTENER.token(),
            Interest::READABLE,
        )?;

        let local = listener.local_addr()?;
        info!("Listening on {}", local);
        self.listener = Some(listener);
        Ok(local)
    }

    /// Watch an accepted connection
    ///
    /// Write-readiness is watched from the start so queued output is flushed
    /// as soon as a slow peer catches up.
    pub fn register(
        &mut self,
        mut stream: TcpStream,
        peer: SocketAddr,
    ) -> io::Result<ConnectionId> {
        let id = ConnectionId(self.next_id);
        self.poll.registry().register(
            &mut stream,
            id.token(),
            Interest::READABLE | Interest::WRITABLE,
        )?;
        self.next_id += 1;

        self.connections.insert(id, Connection::new(id, stream, peer));
        debug!("Registered connection {} ({} open)", id, self.connections.len());
        Ok(id)
    }

    /// Stop watching a connection and hand its socket back
    ///
    /// Dropping the returned stream closes it. The listening socket can never
    /// be unregistered.
    pub fn unregister(&mut self, id: ConnectionId) -> Result<TcpStream, ChatError> {
        if id.is_listener() {
            return Err(ChatError::InvariantViolation(
                "the listening socket cannot be unregistered".to_string(),
            ));
        }

        let conn = self.connections.remove(&id).ok_or_else(|| {
            ChatError::InvariantViolation(format!("connection {} is not registered", id))
        })?;

        let mut stream = Rc::try_unwrap(conn.stream)
            .map_err(|_| {
                ChatError::InvariantViolation(format!("connection {} is still in use", id))
            })?
            .into_inner();
        self.poll.registry().deregister(&mut stream)?;

        debug!("Unregistered connection {} ({} open)", id, self.connections.len());
        Ok(stream)
    }

    /// Run the wait-and-dispatch loop
    ///
    /// Returns only when shut down through a [`ShutdownHandle`] or on a
    /// fatal error.
    pub fn run<H: EventHandler>(&mut self, handler: &mut H) -> Result<(), ChatError> {
        if self.listener.is_none() {
            return Err(ChatError::InvariantViolation(
                "run called before listen".to_string(),
            ));
        }

        let mut events = Events::with_capacity(EVENTS_CAPACITY);
        // Connections with bytes left over from their last turn
        let mut carry_over: Vec<ConnectionId> = Vec::new();
        loop {
            let timeout = if !carry_over.is_empty() {
                Some(Duration::ZERO)
            } else if self.retry_accept {
                Some(ACCEPT_RETRY_DELAY)
            } else {
                None
            };

            if let Err(e) = self.poll.poll(&mut events, timeout) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(e.into());
            }

            let mut accept = std::mem::take(&mut self.retry_accept);
            let mut ready = std::mem::take(&mut carry_over);
            for event in events.iter() {
                match ConnectionId::from(event.token()) {
                    ConnectionId::LISTENER => accept = true,
                    ConnectionId::WAKER => {
                        info!("Shutdown requested, leaving event loop");
                        return Ok(());
                    }
                    id => {
                        if event.is_writable() {
                            self.flush(id);
                        }
                        if !ready.contains(&id) {
                            ready.push(id);
                        }
                    }
                }
            }

            if accept {
                self.accept_pending(handler)?;
            }
            for id in ready {
                if self.dispatch(id, handler)? {
                    carry_over.push(id);
                }
            }
        }
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            waker: Arc::clone(&self.waker),
        }
    }

    /// Number of registered client connections
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Accept every queued connection
    ///
    /// A failed accept leaves the rest of the queue for a timed retry, since
    /// the listener will not report readiness again until a new peer arrives.
    fn accept_pending<H: EventHandler>(&mut self, handler: &mut H) -> Result<(), ChatError> {
        loop {
            let Some(listener) = self.listener.as_ref() else {
                return Ok(());
            };

            let (stream, peer) = match listener.accept() {
                Ok(accepted) => accepted,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    self.retry_accept = true;
                    return Ok(());
                }
            };

            let id = match self.register(stream, peer) {
                Ok(id) => id,
                Err(e) => {
                    warn!("Dropping connection from {}: {}", peer, e);
                    continue;
                }
            };
            info!("New connection {} from {}", id, peer);

            if let Some(conn) = self.connections.get(&id) {
                handler.on_connect(conn)?;
            }
        }
    }

    /// Give a ready connection one turn: a single `on_data`, or its close
    ///
    /// Returns true if the connection needs another turn. Readiness is
    /// edge-triggered, so leftover bytes (or a close that arrived with them)
    /// will not be reported again.
    fn dispatch<H: EventHandler>(
        &mut self,
        id: ConnectionId,
        handler: &mut H,
    ) -> Result<bool, ChatError> {
        let Some(conn) = self.connections.get(&id) else {
            trace!("Ignoring event for unregistered connection {}", id);
            return Ok(false);
        };

        match conn.classify() {
            Readiness::Pending => Ok(false),
            Readiness::Data => {
                handler.on_data(conn)?;
                Ok(conn.classify() != Readiness::Pending)
            }
            Readiness::Closed => {
                drop(self.unregister(id)?);
                info!("Connection {} closed", id);
                handler.on_close(id)?;
                Ok(false)
            }
        }
    }

    fn flush(&self, id: ConnectionId) {
        if let Some(conn) = self.connections.get(&id) {
            if let Err(e) = conn.flush() {
                // The next classification sees the broken connection
                debug!("Flush to {} failed: {}", id, e);
            }
        }
    }
}
