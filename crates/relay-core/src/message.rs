//! Messages waiting in a mailbox.

use crate::ClientName;

/// A message queued for delivery to a mailbox owner.
///
/// Immutable once enqueued. The recipient is implied by the mailbox that
/// holds it; only the sender travels with the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    sender: ClientName,
    body: String,
}

impl OutboundMessage {
    /// Creates a message from `sender`.
    pub fn new(sender: ClientName, body: impl Into<String>) -> Self {
        Self {
            sender,
            body: body.into(),
        }
    }

    pub fn sender(&self) -> &ClientName {
        &self.sender
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// Splits the message into its sender and body.
    pub fn into_parts(self) -> (ClientName, String) {
        (self.sender, self.body)
    }
}
