//! TCP server for the relay daemon.
//!
//! The server:
//! - Listens on a TCP socket for client connections
//! - Spawns a ConnectionHandler for each client
//! - Exposes the registry's administrative operations
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   RelayServer   │
//! │                 │
//! │   TcpListener   │
//! └───────┬─────────┘
//!         │ accept()
//!         ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │ConnectionHandler│────▶│  RegistryHandle │
//! │   (per client)  │     │                 │
//! └─────────────────┘     └─────────────────┘
//! ```
//!
//! Every connection runs under a child of the server's cancellation token,
//! so cancelling the server tears down all connections. Handlers are
//! tracked and `serve` waits for them before returning.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Accept errors are logged and the loop continues
//! - Only bind errors are fatal

mod connection;

pub use connection::{ConnectionError, ConnectionHandler};

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info};

use relay_core::ClientName;

use crate::config::{ConnectionSettings, RelayConfig};
use crate::registry::{spawn_registry, MailboxInfo, RegistryError, RegistryHandle};

/// TCP server for the relay.
pub struct RelayServer {
    listener: TcpListener,

    /// Handle to the mailbox registry
    registry: RegistryHandle,

    settings: ConnectionSettings,

    /// Cancellation token for graceful shutdown
    cancel_token: CancellationToken,

    /// Connection counter for numbering connections
    connection_counter: AtomicU64,

    /// Running connection handlers
    tracker: TaskTracker,
}

impl RelayServer {
    /// Binds the listening socket.
    ///
    /// # Errors
    ///
    /// `ServerError::Bind` if the address cannot be bound.
    pub async fn bind(
        config: &RelayConfig,
        registry: RegistryHandle,
        cancel_token: CancellationToken,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(config.bind_addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: config.bind_addr,
                error: e,
            })?;

        Ok(Self {
            listener,
            registry,
            settings: config.connection_settings(),
            cancel_token,
            connection_counter: AtomicU64::new(0),
            tracker: TaskTracker::new(),
        })
    }

    /// Returns the bound address (useful when binding port 0).
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener.local_addr().map_err(ServerError::LocalAddr)
    }

    /// Every name the relay has seen as sender or target, sorted.
    pub async fn current_clients(&self) -> Vec<ClientName> {
        self.registry.list_names().await
    }

    /// Evicts a name and its backlog. Live connections bound to the name
    /// stay open. Returns the number of undelivered messages dropped.
    pub async fn remove_client(&self, name: ClientName) -> Result<usize, RegistryError> {
        self.registry.remove(name).await
    }

    /// Snapshot of every mailbox.
    pub async fn mailboxes(&self) -> Vec<MailboxInfo> {
        self.registry.list_mailboxes().await
    }

    /// Accepts connections until the cancellation token is triggered, then
    /// waits for every connection handler to finish.
    pub async fn serve(&self) -> Result<(), ServerError> {
        info!(addr = %self.local_addr()?, "Relay server listening");

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }

                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            let connection = self.connection_counter.fetch_add(1, Ordering::Relaxed);
                            self.handle_connection(stream, peer, connection);
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                            // Continue accepting other connections
                        }
                    }
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// Spawns a handler task for an accepted stream.
    fn handle_connection(&self, stream: TcpStream, peer: SocketAddr, connection: u64) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(?peer, error = %e, "Failed to set TCP_NODELAY");
        }

        let (reader, writer) = stream.into_split();
        let handler = ConnectionHandler::new(
            reader,
            writer,
            self.registry.clone(),
            self.settings,
            self.cancel_token.child_token(),
            connection,
        )
        .with_peer(peer);

        self.tracker.spawn(async move {
            handler.run().await;
        });
    }

    async fn shutdown(&self) {
        self.tracker.close();
        debug!(connections = self.tracker.len(), "Waiting for connections to close");
        self.tracker.wait().await;
        info!("Server shutdown complete");
    }
}

/// Spawns a registry, binds `config.bind_addr` and serves until `cancel_token`
/// fires.
///
/// # Errors
///
/// `ServerError::Bind` if the address cannot be bound.
pub async fn listen(config: RelayConfig, cancel_token: CancellationToken) -> Result<(), ServerError> {
    let registry = spawn_registry(config.registry_settings());
    let server = RelayServer::bind(&config, registry, cancel_token).await?;
    server.serve().await
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {error}")]
    Bind {
        addr: SocketAddr,
        #[source]
        error: std::io::Error,
    },

    #[error("Failed to read local address: {0}")]
    LocalAddr(#[source] std::io::Error),
}
