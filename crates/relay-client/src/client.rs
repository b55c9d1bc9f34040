//! Relay connection client.
//!
//! This module provides the `RelayClient` which handles:
//! - Opening the TCP stream and sending the handshake
//! - Writing `target:body` frames
//! - Reading `sender:body` frames, skipping anything malformed
//!
//! The client can be split into a `ClientSender` and a `ClientReceiver` so
//! that sending and receiving run concurrently from different tasks.
//!
//! **Panic-Free Policy:** This module follows the project's panic-free guidelines.
//! No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, or `todo!()`.

use std::fmt;

use futures::{SinkExt, StreamExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, warn};

use relay_core::ClientName;
use relay_protocol::{parse_data_frame, Envelope, FrameCodec, Handshake, ProtocolError};

use crate::error::{ClientError, Result};

// ============================================================================
// Relay Client
// ============================================================================

/// A named connection to the relay.
///
/// # Example
///
/// ```rust,ignore
/// use relay_client::RelayClient;
///
/// let mut alice = RelayClient::connect("127.0.0.1:1025", "alice").await?;
/// alice.send("bob", "hi").await?;
/// if let Some(reply) = alice.receive().await {
///     println!("{}>>{}", reply.peer, reply.body);
/// }
/// ```
pub struct RelayClient {
    sender: ClientSender,
    receiver: ClientReceiver,
}

impl RelayClient {
    /// Opens a stream to the relay and sends the handshake frame.
    ///
    /// # Errors
    ///
    /// - `ClientError::Connect` if the relay cannot be reached
    /// - `ClientError::Protocol` if `name` contains a line break
    pub async fn connect<A>(addr: A, name: impl Into<ClientName>) -> Result<Self>
    where
        A: ToSocketAddrs + fmt::Display,
    {
        let name = name.into();
        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|e| ClientError::Connect {
                addr: addr.to_string(),
                error: e,
            })?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "Failed to set TCP_NODELAY");
        }

        let (read_half, write_half) = stream.into_split();
        let mut writer = FramedWrite::new(write_half, FrameCodec::new());
        writer.send(Handshake(name.clone())).await?;

        info!(client = %name, relay = %addr, "Connected to relay");

        Ok(Self {
            sender: ClientSender { writer, name },
            receiver: ClientReceiver {
                reader: FramedRead::new(read_half, FrameCodec::new()),
            },
        })
    }

    /// The name sent in the handshake.
    pub fn name(&self) -> &ClientName {
        self.sender.name()
    }

    /// Sends `body` to `target`. See [`ClientSender::send`].
    pub async fn send(&mut self, target: &str, body: &str) -> Result<()> {
        self.sender.send(target, body).await
    }

    /// Waits for the next message. See [`ClientReceiver::receive`].
    pub async fn receive(&mut self) -> Option<Envelope> {
        self.receiver.receive().await
    }

    /// Splits the client into halves that can be used from separate tasks.
    pub fn into_split(self) -> (ClientSender, ClientReceiver) {
        (self.sender, self.receiver)
    }

    /// Flushes pending frames and closes the stream.
    pub async fn close(self) -> Result<()> {
        self.sender.close().await
    }
}

// ============================================================================
// Halves
// ============================================================================

/// Writing half of a [`RelayClient`].
pub struct ClientSender {
    writer: FramedWrite<OwnedWriteHalf, FrameCodec>,
    name: ClientName,
}

impl ClientSender {
    /// The name sent in the handshake.
    pub fn name(&self) -> &ClientName {
        &self.name
    }

    /// Writes `target:body` and flushes it.
    ///
    /// Success only means the relay's socket accepted the bytes.
    ///
    /// # Errors
    ///
    /// - `ClientError::Protocol` if `target` is empty or contains `:` or a
    ///   line break, or `body` contains a line break; nothing is written
    /// - `ClientError::Protocol`/`ClientError::Io` if the write fails
    pub async fn send(&mut self, target: &str, body: &str) -> Result<()> {
        let target = ClientName::addressable(target).map_err(ProtocolError::from)?;
        self.writer.send(Envelope::new(target.clone(), body)).await?;

        debug!(client = %self.name, target = %target, len = body.len(), "Sent message");
        Ok(())
    }

    /// Flushes pending frames and shuts down the write side of the stream.
    pub async fn close(mut self) -> Result<()> {
        SinkExt::<Envelope>::close(&mut self.writer).await?;
        debug!(client = %self.name, "Closed relay stream");
        Ok(())
    }
}

/// Reading half of a [`RelayClient`].
pub struct ClientReceiver {
    reader: FramedRead<OwnedReadHalf, FrameCodec>,
}

impl ClientReceiver {
    /// Waits for the next `sender:body` frame.
    ///
    /// Returns `None` once the stream closes or fails. Frames without a
    /// separator are logged and skipped. Cancel-safe.
    pub async fn receive(&mut self) -> Option<Envelope> {
        loop {
            let line = match self.reader.next().await? {
                Ok(line) => line,
                Err(e) => {
                    debug!(error = %e, "Relay stream failed");
                    return None;
                }
            };

            match parse_data_frame(&line) {
                Ok(envelope) => return Some(envelope),
                Err(e) => warn!(error = %e, "Skipping malformed frame from relay"),
            }
        }
    }
}

/// Connects as `from`, sends one message to `to` and closes.
///
/// # Errors
///
/// Any error from connecting, sending or closing.
pub async fn send_once<A>(addr: A, from: &str, to: &str, body: &str) -> Result<()>
where
    A: ToSocketAddrs + fmt::Display,
{
    let mut client = RelayClient::connect(addr, from).await?;
    client.send(to, body).await?;
    client.close().await
}
