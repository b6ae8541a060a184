//! Chat client - Entry Point
//!
//! Reads lines from stdin, sends them to the server, and prints whatever
//! the server sends back.

use std::env;

use tokio::io::{stdin, stdout, BufReader};
use tracing_subscriber::EnvFilter;

use chat_mux::{client, DEFAULT_ADDR};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr so chat output on stdout stays clean
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chat_mux=warn")),
        )
        .init();

    let addr = env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_ADDR.to_string());

    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(async {
        let stream = client::connect(&addr).await?;
        client::chat(stream, BufReader::new(stdin()), stdout()).await
    });

    // A pending stdin read holds a blocking thread; don't wait for it
    runtime.shutdown_background();

    result?;
    Ok(())
}
