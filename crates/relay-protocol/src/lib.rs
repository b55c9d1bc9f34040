//! Relay Protocol - Wire protocol for relay communication
//!
//! Every frame is one UTF-8 line terminated by `\n`. There is no length
//! prefix and no escaping.
//!
//! ```text
//! client                          relay
//!   │  alice\n            (handshake)  │
//!   │ ───────────────────────────────▶ │
//!   │  bob:hi there\n     (target:body)│
//!   │ ───────────────────────────────▶ │
//!   │  carol:hello\n      (sender:body)│
//!   │ ◀─────────────────────────────── │
//! ```
//!
//! Data frames are split on the first colon only, so bodies may contain
//! further colons.

pub mod codec;
pub mod error;
pub mod frame;

pub use codec::{FrameCodec, MAX_FRAME_LENGTH};
pub use error::ProtocolError;
pub use frame::{parse_data_frame, parse_handshake, Envelope, Handshake, SEPARATOR};
