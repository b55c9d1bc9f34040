//! Connection handler for individual client connections.
//!
//! Each accepted stream gets its own `ConnectionHandler`, which walks
//! through four states:
//!
//! ```text
//! HANDSHAKING ──name──▶ ACTIVE ──reader exits──▶ CLOSING ──writer acked──▶ CLOSED
//!                        │
//!                        ├─ reader pump: stream ──▶ registry (Deliver)
//!                        └─ writer pump: mailbox ──▶ stream   (own task)
//! ```
//!
//! The reader pump runs on the handler's task; the writer pump is spawned
//! with a child cancellation token. When the reader pump exits for any
//! reason the handler cancels the writer and waits for it, so the two halves
//! of the stream are dropped exactly once, by their owners.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Transport errors end only the pump that hit them
//! - Malformed frames are logged and dropped

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use relay_core::{ClientName, OutboundMessage};
use relay_protocol::{parse_data_frame, parse_handshake, Envelope, FrameCodec, ProtocolError};

use crate::config::ConnectionSettings;
use crate::mailbox::Mailbox;
use crate::registry::{ConnectionId, RegistryError, RegistryHandle};

/// Connection handler for a single client.
///
/// Generic over the stream halves so it can run on TCP halves in the
/// server and on in-memory duplex pipes in tests.
pub struct ConnectionHandler<R, W> {
    reader: FramedRead<R, FrameCodec>,
    writer: FramedWrite<W, FrameCodec>,
    registry: RegistryHandle,
    settings: ConnectionSettings,
    /// Cancelled on server shutdown or when a newer connection takes the name
    cancel: CancellationToken,
    connection: ConnectionId,
    peer: Option<SocketAddr>,
}

impl<R, W> ConnectionHandler<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Creates a new connection handler.
    ///
    /// # Arguments
    ///
    /// * `reader` / `writer` - The two halves of the client stream
    /// * `registry` - Handle to the mailbox registry
    /// * `settings` - Timeouts and frame limits
    /// * `cancel` - Token that tears the whole connection down
    /// * `connection` - Unique number for this connection
    pub fn new(
        reader: R,
        writer: W,
        registry: RegistryHandle,
        settings: ConnectionSettings,
        cancel: CancellationToken,
        connection: ConnectionId,
    ) -> Self {
        Self {
            reader: FramedRead::new(reader, FrameCodec::with_max_length(settings.max_frame_length)),
            writer: FramedWrite::new(
                writer,
                FrameCodec::with_max_length(settings.max_frame_length).relaying(),
            ),
            registry,
            settings,
            cancel,
            connection,
            peer: None,
        }
    }

    /// Records the remote address for log output.
    pub fn with_peer(mut self, peer: SocketAddr) -> Self {
        self.peer = Some(peer);
        self
    }

    /// Runs the connection to completion.
    ///
    /// Returns the bound name, or `None` if the handshake never completed
    /// or the name could not be claimed.
    pub async fn run(self) -> Option<ClientName> {
        let Self {
            mut reader,
            writer,
            registry,
            settings,
            cancel,
            connection,
            peer,
        } = self;

        debug!(connection, ?peer, "New client connected");

        // HANDSHAKING
        let name = match read_handshake(&mut reader, &cancel, settings.idle_timeout).await {
            Ok(name) => name,
            Err(e) => {
                debug!(connection, ?peer, error = %e, "Handshake failed");
                return None;
            }
        };

        let mailbox = match registry.claim(name.clone(), connection, cancel.clone()).await {
            Ok(mailbox) => mailbox,
            Err(e) => {
                warn!(client = %name, connection, ?peer, error = %e, "Refusing connection");
                return None;
            }
        };

        info!(
            client = %name,
            connection,
            ?peer,
            pending = mailbox.len(),
            "Client connected"
        );

        // ACTIVE
        let writer_token = cancel.child_token();
        let writer_task = tokio::spawn(
            WriterPump {
                writer,
                mailbox,
                name: name.clone(),
                connection,
                registry: registry.clone(),
                write_timeout: settings.write_timeout,
                cancel: writer_token.clone(),
                claim_token: cancel.clone(),
            }
            .run(),
        );

        let outcome = ReaderPump {
            reader: &mut reader,
            name: &name,
            connection,
            registry: &registry,
            idle_timeout: settings.idle_timeout,
            cancel: &cancel,
        }
        .run()
        .await;

        // CLOSING
        writer_token.cancel();
        let delivered = match writer_task.await {
            Ok(delivered) => delivered,
            Err(e) => {
                warn!(client = %name, connection, error = %e, "Writer pump failed");
                0
            }
        };

        // CLOSED: the mailbox stays, only the binding goes.
        registry.release(name.clone(), connection).await;

        match outcome {
            Ok(()) => info!(client = %name, connection, delivered, "Client disconnected"),
            Err(e) => info!(
                client = %name,
                connection,
                delivered,
                reason = %e,
                "Client connection closed"
            ),
        }

        Some(name)
    }
}

/// Reads the first line and turns it into the bound name.
async fn read_handshake<R>(
    reader: &mut FramedRead<R, FrameCodec>,
    cancel: &CancellationToken,
    idle_timeout: Option<Duration>,
) -> Result<ClientName, ConnectionError>
where
    R: AsyncRead + Unpin,
{
    let line = tokio::select! {
        _ = cancel.cancelled() => return Err(ConnectionError::Cancelled),
        line = read_line(reader, idle_timeout) => line?,
    };

    match line {
        Some(line) => Ok(parse_handshake(&line).0),
        None => Err(ConnectionError::Eof),
    }
}

/// Reads one line, honouring the optional idle timeout.
///
/// `Ok(None)` is a clean end of stream.
async fn read_line<R>(
    reader: &mut FramedRead<R, FrameCodec>,
    idle_timeout: Option<Duration>,
) -> Result<Option<String>, ConnectionError>
where
    R: AsyncRead + Unpin,
{
    let next = match idle_timeout {
        Some(limit) => timeout(limit, reader.next())
            .await
            .map_err(|_| ConnectionError::Timeout)?,
        None => reader.next().await,
    };

    next.transpose().map_err(ConnectionError::from)
}

// ============================================================================
// Reader Pump
// ============================================================================

/// Moves frames from the stream into target mailboxes.
struct ReaderPump<'a, R> {
    reader: &'a mut FramedRead<R, FrameCodec>,
    name: &'a ClientName,
    connection: ConnectionId,
    registry: &'a RegistryHandle,
    idle_timeout: Option<Duration>,
    cancel: &'a CancellationToken,
}

impl<R> ReaderPump<'_, R>
where
    R: AsyncRead + Unpin,
{
    /// Runs until end of stream (`Ok`) or a transport error, timeout or
    /// cancellation (`Err`).
    async fn run(mut self) -> Result<(), ConnectionError> {
        loop {
            let line = tokio::select! {
                _ = self.cancel.cancelled() => return Err(ConnectionError::Cancelled),
                line = read_line(&mut *self.reader, self.idle_timeout) => line?,
            };

            let Some(line) = line else {
                debug!(client = %self.name, connection = self.connection, "Client sent EOF");
                return Ok(());
            };

            let envelope = match parse_data_frame(&line) {
                Ok(envelope) => envelope,
                Err(e) => {
                    warn!(
                        client = %self.name,
                        connection = self.connection,
                        error = %e,
                        "Dropping malformed frame"
                    );
                    continue;
                }
            };

            debug!(
                client = %self.name,
                target = %envelope.peer,
                len = envelope.body.len(),
                "Received message"
            );

            let message = OutboundMessage::new(self.name.clone(), envelope.body);
            self.registry.deliver(envelope.peer, message).await?;
        }
    }
}

// ============================================================================
// Writer Pump
// ============================================================================

/// Moves messages from the bound mailbox onto the stream.
struct WriterPump<W> {
    writer: FramedWrite<W, FrameCodec>,
    mailbox: Arc<Mailbox>,
    name: ClientName,
    connection: ConnectionId,
    registry: RegistryHandle,
    write_timeout: Duration,
    cancel: CancellationToken,
    /// Token registered with the registry, reused on reattach
    claim_token: CancellationToken,
}

impl<W> WriterPump<W>
where
    W: AsyncWrite + Unpin,
{
    /// Runs until cancelled or a write fails. Returns the number of
    /// messages delivered.
    ///
    /// Cancellation is only observed while waiting for the next message,
    /// never between taking a message off the queue and writing it.
    async fn run(mut self) -> usize {
        let mut delivered = 0;

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                next = self.mailbox.recv() => next,
            };

            let Some(message) = next else {
                if !self.reattach().await {
                    break;
                }
                continue;
            };

            match self.write(message.clone()).await {
                Ok(()) => delivered += 1,
                Err(ConnectionError::Framing(e)) if e.is_recoverable() => {
                    warn!(
                        client = %self.name,
                        sender = %message.sender(),
                        error = %e,
                        "Dropping message that cannot be framed"
                    );
                }
                Err(e) => {
                    // Keep it for the next connection under this name.
                    self.mailbox.requeue(message);
                    debug!(
                        client = %self.name,
                        connection = self.connection,
                        error = %e,
                        "Write failed, stopping writer"
                    );
                    break;
                }
            }
        }

        debug!(client = %self.name, connection = self.connection, delivered, "Writer stopped");
        delivered
    }

    async fn write(&mut self, message: OutboundMessage) -> Result<(), ConnectionError> {
        timeout(self.write_timeout, self.writer.send(Envelope::from(message)))
            .await
            .map_err(|_| ConnectionError::WriteTimeout)?
            .map_err(ConnectionError::from)
    }

    /// Swaps in the fresh mailbox after the old one was removed.
    async fn reattach(&mut self) -> bool {
        match self
            .registry
            .reattach(self.name.clone(), self.connection, self.claim_token.clone())
            .await
        {
            Ok(mailbox) => {
                info!(client = %self.name, connection = self.connection, "Mailbox was removed, reattached");
                self.mailbox = mailbox;
                true
            }
            Err(e) => {
                debug!(client = %self.name, error = %e, "Could not reattach after removal");
                false
            }
        }
    }
}

/// Errors that end a connection or one of its pumps.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Connection closed")]
    Eof,

    #[error("Transport error: {0}")]
    Framing(#[from] ProtocolError),

    #[error("Idle timeout")]
    Timeout,

    #[error("Write timeout")]
    WriteTimeout,

    #[error("Connection cancelled")]
    Cancelled,

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}
