//! Relay Core - Shared types for the message relay
//!
//! This crate provides the domain types shared between
//! the daemon (relayd) and the client library (relay-client).
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod error;
pub mod message;
pub mod name;

// Re-exports for convenience
pub use error::{DomainError, DomainResult};
pub use message::OutboundMessage;
pub use name::ClientName;
