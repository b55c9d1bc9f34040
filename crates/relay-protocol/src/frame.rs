//! Frame grammar.

use std::fmt;

use relay_core::{ClientName, OutboundMessage};

use crate::ProtocolError;

/// Separator between the name and the body of a data frame.
pub const SEPARATOR: char = ':';

/// First frame on every connection: the bare client name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake(pub ClientName);

/// A data frame, `<peer>:<body>`.
///
/// The meaning of `peer` depends on direction: client-sent frames carry the
/// target, relay-delivered frames carry the sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub peer: ClientName,
    pub body: String,
}

impl Envelope {
    pub fn new(peer: impl Into<ClientName>, body: impl Into<String>) -> Self {
        Self {
            peer: peer.into(),
            body: body.into(),
        }
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.peer, SEPARATOR, self.body)
    }
}

/// Delivered frames are rebuilt from the queued message, never forwarded
/// verbatim.
impl From<OutboundMessage> for Envelope {
    fn from(message: OutboundMessage) -> Self {
        let (sender, body) = message.into_parts();
        Self { peer: sender, body }
    }
}

/// Interprets a handshake line.
///
/// Whatever arrives becomes the name; there is nothing to reject.
pub fn parse_handshake(line: &str) -> Handshake {
    Handshake(ClientName::new(line))
}

/// Splits a data line on its first colon.
///
/// # Errors
///
/// `ProtocolError::MissingSeparator` if the line has no colon.
pub fn parse_data_frame(line: &str) -> Result<Envelope, ProtocolError> {
    match line.split_once(SEPARATOR) {
        Some((peer, body)) => Ok(Envelope::new(peer, body)),
        None => Err(ProtocolError::MissingSeparator {
            line: line.to_string(),
        }),
    }
}
