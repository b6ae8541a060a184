//! Client socket with an outbound queue
//!
//! Writes go straight to the socket while the kernel keeps up. Whatever it
//! does not take is queued and flushed on a later writable event, so every
//! frame reaches the peer whole and in order, or not at all.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, Read, Write};

use mio::net::TcpStream;

use crate::error::SendError;
use crate::types::MAX_OUTBOUND_BYTES;

/// Non-blocking socket plus the bytes still waiting to be written to it
#[derive(Debug)]
pub struct PeerStream {
    stream: TcpStream,
    outbound: RefCell<VecDeque<u8>>,
}

impl PeerStream {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            outbound: RefCell::new(VecDeque::new()),
        }
    }

    pub fn get_ref(&self) -> &TcpStream {
        &self.stream
    }

    /// Unwrap the socket, discarding anything still queued
    pub fn into_inner(self) -> TcpStream {
        self.stream
    }

    /// Single non-blocking read into `buf`
    pub fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        (&self.stream).read(buf)
    }

    /// Write `bytes` as one frame
    ///
    /// Nothing overtakes bytes already queued. A frame that would push the
    /// queue past `MAX_OUTBOUND_BYTES` is rejected as a whole.
    pub fn send(&self, bytes: &[u8]) -> Result<(), SendError> {
        let mut queue = self.outbound.borrow_mut();
        if !queue.is_empty() {
            if queue.len() + bytes.len() > MAX_OUTBOUND_BYTES {
                return Err(SendError::Overflow);
            }
            queue.extend(bytes);
            return Ok(());
        }

        let mut written = 0;
        while written < bytes.len() {
            match (&self.stream).write(&bytes[written..]) {
                Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero).into()),
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        queue.extend(&bytes[written..]);
        Ok(())
    }

    /// Write queued bytes until the queue is empty or the socket is full
    pub fn flush(&self) -> io::Result<()> {
        let mut queue = self.outbound.borrow_mut();
        while !queue.is_empty() {
            let (front, _) = queue.as_slices();
            match (&self.stream).write(front) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => {
                    queue.drain(..n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Bytes accepted by `send` but not yet handed to the kernel
    pub fn pending_bytes(&self) -> usize {
        self.outbound.borrow().len()
    }
}
