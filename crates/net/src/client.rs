//! TCP client handle for a Tally server
//!
//! Deliberately thin: one call sends a request, another awaits the next
//! server message. Integration tests and command-line tooling drive it
//! directly; a UI would wrap it in its own event loop.

use std::net::SocketAddr;

use tokio::io::{ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::Result;
use crate::frame::{read_frame, write_frame};
use crate::protocol::{ClientMessage, ServerMessage};

/// Client side of one server connection
pub struct Client {
    reader: ReadHalf<TcpStream>,
    writer: WriteHalf<TcpStream>,
}

impl Client {
    /// Open a connection to a Tally server
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        debug!(addr = %addr, "Connecting to server");
        let stream = TcpStream::connect(addr).await?;
        let (reader, writer) = tokio::io::split(stream);
        Ok(Self { reader, writer })
    }

    /// Send one request
    pub async fn send(&mut self, msg: &ClientMessage) -> Result<()> {
        write_frame(&mut self.writer, msg).await
    }

    /// Await the next server message
    pub async fn next_message(&mut self) -> Result<ServerMessage> {
        read_frame(&mut self.reader).await
    }
}
