//! Relay Daemon - Mailbox registry and relay server
//!
//! This crate provides the core infrastructure for the relay daemon:
//! - `mailbox` - Unbounded per-name message queue
//! - `registry` - Mailbox registry actor, the only cross-connection state
//! - `server` - TCP server and per-connection reader/writer pumps
//! - `config` - Server configuration
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       relayd daemon                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │   RelayServer   │────▶│       RegistryActor         │   │
//! │  │  (TcpListener)  │     │  (name → Mailbox owner)     │   │
//! │  └────────┬────────┘     └──────────────┬──────────────┘   │
//! │           │                             │                   │
//! │           │ connections                 │ Arc<Mailbox>      │
//! │           ▼                             ▼                   │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │ConnectionHandler│     │  reader pump ─▶ Deliver     │   │
//! │  │  (per client)   │────▶│  writer pump ◀─ Mailbox     │   │
//! │  └─────────────────┘     └─────────────────────────────┘   │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod config;
pub mod mailbox;
pub mod registry;
pub mod server;
