//! Protocol errors.

use std::io;

use relay_core::DomainError;
use thiserror::Error;
use tokio_util::codec::LinesCodecError;

/// Errors raised while framing or parsing relay frames.
///
/// Only [`ProtocolError::MissingSeparator`] is recoverable on a live
/// connection: the offending frame is dropped and reading continues.
/// Everything else means the byte stream itself can no longer be trusted.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A data frame without the `:` that separates name and body.
    #[error("frame has no ':' separator: {line:?}")]
    MissingSeparator { line: String },

    /// A value that cannot be carried inside a single frame.
    #[error("invalid frame content: {0}")]
    Invalid(#[from] DomainError),

    /// The peer sent more than `max` bytes without a line terminator.
    #[error("frame exceeds {max} bytes")]
    FrameTooLong { max: usize },

    /// Transport failure, including invalid UTF-8 on the wire.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ProtocolError {
    /// Returns true if the connection can keep reading after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::MissingSeparator { .. } | Self::Invalid(_))
    }

    pub(crate) fn from_lines(err: LinesCodecError, max: usize) -> Self {
        match err {
            LinesCodecError::MaxLineLengthExceeded => Self::FrameTooLong { max },
            LinesCodecError::Io(e) => Self::Io(e),
        }
    }
}
