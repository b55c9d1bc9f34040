//! Error types for the relay client.

use std::io;

use relay_protocol::ProtocolError;
use thiserror::Error;

/// Client errors.
///
/// A failed `send` only means the local write to the relay did not
/// complete. Nothing in the protocol reports whether the target read it.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Could not open the stream to the relay.
    ///
    /// Usually the daemon is not running or listens elsewhere
    /// (see `RELAY_ADDR`).
    #[error("Failed to connect to relay at {addr}: {error}")]
    Connect {
        addr: String,
        #[source]
        error: io::Error,
    },

    /// Transport failure on an established stream.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The frame could not be built or sent.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl ClientError {
    /// True when the message was refused before touching the stream, so
    /// the connection is still usable.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::Protocol(ProtocolError::Invalid(_)))
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
