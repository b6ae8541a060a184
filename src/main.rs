//! Chat server - Entry Point
//!
//! Binds the listening socket and runs the multiplexer loop on the main
//! thread.

use std::env;

use tracing::info;
use tracing_subscriber::EnvFilter;

use chat_mux::{ChatHandler, ConnectionMultiplexer, DEFAULT_ADDR};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=chat_mux=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chat_mux=info")),
        )
        .init();

    // Get bind address from command line or use default
    let addr = env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_ADDR.to_string());

    let mut mux = ConnectionMultiplexer::new()?;
    let bound = mux.listen(&addr)?;
    info!("Chat server listening on {}", bound);

    let mut handler = ChatHandler::new();
    mux.run(&mut handler)?;

    info!("Chat server stopped");
    Ok(())
}
