//! Relay Client - Protocol-conformant peer for the relay daemon
//!
//! - `client` - `RelayClient` with `connect`/`send`/`receive`, splittable
//!   into independent sending and receiving halves
//! - `conversation` - Terminal front-end that chats with a single peer
//! - `error` - `ClientError`
//!
//! **Panic-Free Policy:** No `.unwrap()`, `.expect()`, `panic!()`,
//! `unreachable!()`, or `todo!()` outside of tests.

pub mod client;
pub mod conversation;
pub mod error;

pub use client::{send_once, ClientReceiver, ClientSender, RelayClient};
pub use conversation::Conversation;
pub use error::{ClientError, Result};

pub use relay_protocol::Envelope;
