//! Interactive chat client
//!
//! Connects to the server and runs two halves side by side: one forwards
//! local input lines to the server, the other copies everything the server
//! sends to the local output. When either half ends, the other is dropped
//! with it.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::error::ChatError;
use crate::message;
use crate::types::CLIENT_READ_BUFFER_SIZE;

/// Printed when the server closes the connection
pub const SERVER_CLOSED: &str = "The server has closed the connection.";

/// Why a chat session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientExit {
    /// The server sent end-of-stream
    ServerClosed,
    /// Local input reached end-of-file
    InputClosed,
}

/// Open a connection to the chat server
pub async fn connect(addr: &str) -> Result<TcpStream, ChatError> {
    let stream = TcpStream::connect(addr).await?;
    info!("Connected to {}", addr);
    Ok(stream)
}

/// Run a chat session until the server or the local input goes away
pub async fn chat<I, O>(stream: TcpStream, input: I, output: O) -> Result<ClientExit, ChatError>
where
    I: AsyncBufRead + Unpin,
    O: AsyncWrite + Unpin,
{
    let (reader, writer) = stream.into_split();

    let exit = tokio::select! {
        result = send_input(input, writer) => {
            result?;
            debug!("Local input ended");
            ClientExit::InputClosed
        }
        result = print_incoming(reader, output) => {
            result?;
            debug!("Server ended the session");
            ClientExit::ServerClosed
        }
    };

    Ok(exit)
}

/// Forward every input line to the server, newline-terminated
async fn send_input<I>(input: I, mut writer: OwnedWriteHalf) -> std::io::Result<()>
where
    I: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        writer.write_all(&message::frame(&line)).await?;
    }
    writer.shutdown().await
}

/// Copy server bytes to `output` until the server closes
async fn print_incoming<O>(mut reader: OwnedReadHalf, mut output: O) -> std::io::Result<()>
where
    O: AsyncWrite + Unpin,
{
    let mut buf = [0u8; CLIENT_READ_BUFFER_SIZE];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            output.write_all(&message::frame(SERVER_CLOSED)).await?;
            output.flush().await?;
            return Ok(());
        }
        output.write_all(&buf[..n]).await?;
        output.flush().await?;
    }
}
