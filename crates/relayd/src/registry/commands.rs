//! Registry actor commands, errors, and snapshots.
//!
//! This module defines the message types for communicating with the `RegistryActor`:
//! - `RegistryCommand`: Commands sent to the actor
//! - `RegistryError`: Errors that can occur during registry operations
//! - `MailboxInfo`: Point-in-time view of one mailbox
//!
//! All types are designed for async message passing and follow the panic-free policy.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use relay_core::{ClientName, OutboundMessage};

use crate::mailbox::Mailbox;

/// Number assigned to each accepted connection.
pub type ConnectionId = u64;

// ============================================================================
// Registry Commands
// ============================================================================

/// Commands sent to the registry actor.
///
/// Commands that produce a result carry a oneshot channel for the response.
/// The actor processes commands one at a time, so every creation, delivery
/// and removal is serialized through a single owner.
#[derive(Debug)]
pub enum RegistryCommand {
    /// Return the mailbox for a name, creating it on first reference.
    GetOrCreate {
        name: ClientName,
        respond_to: oneshot::Sender<Arc<Mailbox>>,
    },

    /// Enqueue a message for `target`, creating its mailbox if needed.
    ///
    /// Fire-and-forget: ordering is the order in which the actor receives
    /// deliveries.
    Deliver {
        target: ClientName,
        message: OutboundMessage,
    },

    /// Bind a connection as the consumer of a name's mailbox.
    ///
    /// # Errors
    /// - `RegistryError::NameInUse` if another live connection holds the
    ///   name and the policy is `Reject`
    Claim {
        name: ClientName,
        connection: ConnectionId,
        /// Cancelled if a later claim evicts this connection
        token: CancellationToken,
        respond_to: oneshot::Sender<Result<Arc<Mailbox>, RegistryError>>,
    },

    /// Re-bind a connection after its mailbox was removed underneath it.
    ///
    /// Never evicts anybody.
    ///
    /// # Errors
    /// - `RegistryError::NameInUse` if another live connection has
    ///   claimed the name in the meantime
    Reattach {
        name: ClientName,
        connection: ConnectionId,
        token: CancellationToken,
        respond_to: oneshot::Sender<Result<Arc<Mailbox>, RegistryError>>,
    },

    /// Unbind a connection from a name. The mailbox itself stays.
    Release {
        name: ClientName,
        connection: ConnectionId,
    },

    /// All names ever referenced, sorted.
    ListNames {
        respond_to: oneshot::Sender<Vec<ClientName>>,
    },

    /// Snapshot of every mailbox, sorted by name.
    ListMailboxes {
        respond_to: oneshot::Sender<Vec<MailboxInfo>>,
    },

    /// Evict a name and drop its undelivered messages.
    ///
    /// Responds with the number of messages dropped.
    ///
    /// # Errors
    /// - `RegistryError::NotFound` if the name was never referenced
    Remove {
        name: ClientName,
        respond_to: oneshot::Sender<Result<usize, RegistryError>>,
    },

    /// Log mailboxes whose backlog reached the warning threshold.
    ///
    /// Fire-and-forget, sent periodically by the backlog reporter.
    ReportBacklog,
}

// ============================================================================
// Registry Errors
// ============================================================================

/// Errors that can occur during registry operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// Another live connection is bound to this name.
    #[error("name already in use: {0}")]
    NameInUse(ClientName),

    /// The name has no mailbox.
    #[error("no mailbox for: {0}")]
    NotFound(ClientName),

    /// The actor has shut down.
    #[error("registry channel closed")]
    ChannelClosed,
}

// ============================================================================
// Snapshots
// ============================================================================

/// Point-in-time view of a mailbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxInfo {
    pub name: ClientName,
    /// Messages waiting for delivery
    pub pending: usize,
    /// Whether a live connection is currently bound to the name
    pub connected: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_error_display() {
        let err = RegistryError::NameInUse(ClientName::new("alice"));
        assert_eq!(err.to_string(), "name already in use: alice");

        let err = RegistryError::NotFound(ClientName::new("zed"));
        assert!(err.to_string().contains("zed"));
    }
}
