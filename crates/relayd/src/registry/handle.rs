//! Client interface for interacting with the RegistryActor.
//!
//! The `RegistryHandle` provides a cheap-to-clone interface for sending
//! commands to the registry actor. Connection handlers, the server and
//! tests all go through it; nothing else touches the mailbox table.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Channel errors are mapped to `RegistryError::ChannelClosed`

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use relay_core::{ClientName, OutboundMessage};

use super::commands::{ConnectionId, MailboxInfo, RegistryCommand, RegistryError};
use crate::mailbox::Mailbox;

/// Handle for interacting with the registry actor.
///
/// # Usage
///
/// ```ignore
/// let handle = registry_handle.clone();
///
/// // Queue a message for a name that may not have connected yet
/// handle.deliver(ClientName::new("dave"), message).await?;
///
/// // Names ever referenced, sorted
/// let names = handle.list_names().await;
/// ```
#[derive(Clone, Debug)]
pub struct RegistryHandle {
    sender: mpsc::Sender<RegistryCommand>,
}

impl RegistryHandle {
    pub fn new(sender: mpsc::Sender<RegistryCommand>) -> Self {
        Self { sender }
    }

    /// Returns the mailbox for `name`, creating it on first reference.
    ///
    /// Concurrent first references to one name yield the same mailbox.
    ///
    /// # Errors
    ///
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn get_or_create(&self, name: ClientName) -> Result<Arc<Mailbox>, RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::GetOrCreate {
                name,
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)
    }

    /// Queues `message` in `target`'s mailbox.
    ///
    /// Returns once the actor has accepted the command; deliveries from one
    /// caller are queued in call order.
    ///
    /// # Errors
    ///
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn deliver(
        &self,
        target: ClientName,
        message: OutboundMessage,
    ) -> Result<(), RegistryError> {
        self.sender
            .send(RegistryCommand::Deliver { target, message })
            .await
            .map_err(|_| RegistryError::ChannelClosed)
    }

    /// Binds `connection` as the consumer of `name`'s mailbox.
    ///
    /// `token` is cancelled if a later connection evicts this one.
    ///
    /// # Errors
    ///
    /// - `RegistryError::NameInUse` if duplicates are rejected and the name is held
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn claim(
        &self,
        name: ClientName,
        connection: ConnectionId,
        token: CancellationToken,
    ) -> Result<Arc<Mailbox>, RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Claim {
                name,
                connection,
                token,
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)?
    }

    /// Re-binds `connection` to a freshly created mailbox for `name`.
    ///
    /// # Errors
    ///
    /// - `RegistryError::NameInUse` if somebody else holds the name now
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn reattach(
        &self,
        name: ClientName,
        connection: ConnectionId,
        token: CancellationToken,
    ) -> Result<Arc<Mailbox>, RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Reattach {
                name,
                connection,
                token,
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)?
    }

    /// Unbinds `connection` from `name`. Fire-and-forget.
    pub async fn release(&self, name: ClientName, connection: ConnectionId) {
        // Ignore send errors (actor may be shutting down)
        let _ = self
            .sender
            .send(RegistryCommand::Release { name, connection })
            .await;
    }

    /// Every name ever referenced as a sender or target, sorted.
    ///
    /// Returns an empty vector if communication with the actor fails.
    pub async fn list_names(&self) -> Vec<ClientName> {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::ListNames { respond_to: tx })
            .await
            .is_err()
        {
            return Vec::new();
        }

        rx.await.unwrap_or_default()
    }

    /// Snapshot of every mailbox, sorted by name.
    ///
    /// Returns an empty vector if communication with the actor fails.
    pub async fn list_mailboxes(&self) -> Vec<MailboxInfo> {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::ListMailboxes { respond_to: tx })
            .await
            .is_err()
        {
            return Vec::new();
        }

        rx.await.unwrap_or_default()
    }

    /// Evicts `name` and its undelivered messages.
    ///
    /// Live connections bound to the name are not closed. Returns the
    /// number of messages dropped.
    ///
    /// # Errors
    ///
    /// - `RegistryError::NotFound` if the name has no mailbox
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn remove(&self, name: ClientName) -> Result<usize, RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Remove {
                name,
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)?
    }

    /// Asks the actor to log oversized backlogs. Fire-and-forget.
    pub async fn report_backlog(&self) {
        let _ = self.sender.send(RegistryCommand::ReportBacklog).await;
    }

    /// Check if the actor is still running.
    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_handle() -> (RegistryHandle, mpsc::Receiver<RegistryCommand>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        (RegistryHandle::new(cmd_tx), cmd_rx)
    }

    #[tokio::test]
    async fn test_deliver_sends_command() {
        let (handle, mut rx) = create_test_handle();

        handle
            .deliver(
                ClientName::new("bob"),
                OutboundMessage::new(ClientName::new("alice"), "hi"),
            )
            .await
            .unwrap();

        match rx.recv().await {
            Some(RegistryCommand::Deliver { target, message }) => {
                assert_eq!(target.as_str(), "bob");
                assert_eq!(message.sender().as_str(), "alice");
                assert_eq!(message.body(), "hi");
            }
            other => panic!("Expected Deliver, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_claim_forwards_actor_error() {
        let (handle, mut rx) = create_test_handle();

        let cmd_handler = tokio::spawn(async move {
            if let Some(RegistryCommand::Claim {
                name,
                connection,
                respond_to,
                ..
            }) = rx.recv().await
            {
                assert_eq!(connection, 7);
                let _ = respond_to.send(Err(RegistryError::NameInUse(name)));
                return true;
            }
            false
        });

        let result = handle
            .claim(ClientName::new("bob"), 7, CancellationToken::new())
            .await;
        assert_eq!(
            result.unwrap_err(),
            RegistryError::NameInUse(ClientName::new("bob"))
        );
        assert!(cmd_handler.await.unwrap());
    }

    #[tokio::test]
    async fn test_get_or_create_channel_closed_error() {
        let (handle, rx) = create_test_handle();
        drop(rx);

        let result = handle.get_or_create(ClientName::new("bob")).await;
        assert!(matches!(result, Err(RegistryError::ChannelClosed)));
    }

    #[tokio::test]
    async fn test_dropped_responder_maps_to_channel_closed() {
        let (handle, mut rx) = create_test_handle();

        tokio::spawn(async move {
            // Receive the command and drop the responder unanswered.
            let _ = rx.recv().await;
        });

        let result = handle.remove(ClientName::new("bob")).await;
        assert!(matches!(result, Err(RegistryError::ChannelClosed)));
    }

    #[tokio::test]
    async fn test_listings_empty_on_channel_close() {
        let (handle, rx) = create_test_handle();
        drop(rx);

        assert!(handle.list_names().await.is_empty());
        assert!(handle.list_mailboxes().await.is_empty());
    }

    #[tokio::test]
    async fn test_fire_and_forget_ignore_closed_channel() {
        let (handle, rx) = create_test_handle();
        drop(rx);

        handle.release(ClientName::new("bob"), 1).await;
        handle.report_backlog().await;
        assert!(!handle.is_connected());
    }
}
