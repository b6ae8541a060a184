//! Multi-user TCP Chat Server Library
//!
//! Every line a client sends is relayed to all other connected clients.
//! Clients get a unique, auto-assigned first name and receive server notices
//! when others join or leave.
//!
//! # Architecture
//! The server is a single-threaded, readiness-driven event loop built on
//! `mio`:
//! - `ConnectionMultiplexer` is the only place that blocks. It accepts
//!   connections and classifies each readable socket as "data" or "closed"
//!   with a non-destructive peek before anything is read.
//! - `ChatHandler` implements `EventHandler` and holds the chat policy.
//! - `UserRegistry` and `NameRegistry` track who is connected and which
//!   names are taken. No locks are needed since everything runs on the
//!   loop thread.
//!
//! The interactive client in [`client`] is a small tokio program with a
//! send half and a receive half.
//!
//! # Example
//! ```ignore
//! use chat_mux::{ChatHandler, ConnectionMultiplexer};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut mux = ConnectionMultiplexer::new()?;
//!     mux.listen("127.0.0.1:5555")?;
//!     mux.run(&mut ChatHandler::new())?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod error;
pub mod handler;
pub mod message;
pub mod names;
pub mod registry;
pub mod server;
pub mod stream;
pub mod types;
pub mod user;

// Re-export main types for convenience
pub use client::ClientExit;
pub use error::{ChatError, SendError};
pub use handler::ChatHandler;
pub use names::{FirstNames, NameRegistry, NameSource};
pub use registry::UserRegistry;
pub use server::{Connection, ConnectionMultiplexer, EventHandler, Readiness, ShutdownHandle};
pub use stream::PeerStream;
pub use types::{ConnectionId, DEFAULT_ADDR};
pub use user::User;
