//! Newline framing for relay streams.
//!
//! Wraps `LinesCodec` so both halves of a connection can be driven with
//! `FramedRead` / `FramedWrite`. Decoding yields raw lines (terminator and
//! a trailing `\r` removed); what a line means depends on where in the
//! conversation it arrives, so interpretation is left to the caller.

use relay_core::DomainError;
use tokio_util::bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, LinesCodec};

use crate::frame::{Envelope, Handshake};
use crate::ProtocolError;

/// Default upper bound for a single frame (1 MiB).
pub const MAX_FRAME_LENGTH: usize = 1_048_576;

/// Codec for relay frames.
///
/// Encoding refuses `\n` and, unless [`FrameCodec::relaying`] is set, `\r`.
/// Clients keep the strict check; the relay forwards whatever its own
/// decoder accepted, and a decoded line can never contain `\n`.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    lines: LinesCodec,
    max_length: usize,
    allow_carriage_return: bool,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameCodec {
    /// Creates a codec limited to [`MAX_FRAME_LENGTH`] bytes per frame.
    pub fn new() -> Self {
        Self::with_max_length(MAX_FRAME_LENGTH)
    }

    /// Creates a codec with a custom frame length limit.
    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(max_length),
            max_length,
            allow_carriage_return: false,
        }
    }

    /// Lets encoded names and bodies carry a bare `\r`.
    ///
    /// Used on the relay's delivery path so a frame that was accepted on
    /// the way in is never refused on the way out.
    pub fn relaying(mut self) -> Self {
        self.allow_carriage_return = true;
        self
    }

    fn check(&self, field: &'static str, value: &str) -> Result<(), ProtocolError> {
        let forbidden: &[char] = if self.allow_carriage_return {
            &['\n']
        } else {
            &['\n', '\r']
        };
        if value.contains(forbidden) {
            return Err(DomainError::LineBreak {
                field,
                value: value.to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn encode_line(&mut self, line: String, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        tracing::trace!(frame_len = line.len(), "Encoding frame");
        self.lines
            .encode(line, dst)
            .map_err(|e| ProtocolError::from_lines(e, self.max_length))
    }
}

impl Decoder for FrameCodec {
    type Item = String;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.lines
            .decode(src)
            .map_err(|e| ProtocolError::from_lines(e, self.max_length))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.lines
            .decode_eof(src)
            .map_err(|e| ProtocolError::from_lines(e, self.max_length))
    }
}

impl Encoder<Envelope> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Envelope, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.check("name", item.peer.as_str())?;
        self.check("body", &item.body)?;
        self.encode_line(item.to_string(), dst)
    }
}

impl Encoder<Handshake> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Handshake, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.check("name", item.0.as_str())?;
        self.encode_line(item.0.into_inner(), dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{SinkExt, StreamExt};
    use relay_core::ClientName;
    use tokio_util::codec::{FramedRead, FramedWrite};

    #[test]
    fn test_decode_strips_terminators() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from("alice\r\nbob:hi\n");

        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("alice"));
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("bob:hi"));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_decode_waits_for_terminator() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from("bob:partial");
        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(b" line\n");
        assert_eq!(
            codec.decode(&mut buf).unwrap().as_deref(),
            Some("bob:partial line")
        );
    }

    #[test]
    fn test_decode_rejects_oversized_frame() {
        let mut codec = FrameCodec::with_max_length(8);
        let mut buf = BytesMut::from("0123456789abcdef\n");
        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, ProtocolError::FrameTooLong { max: 8 }));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_encode_envelope() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        codec
            .encode(Envelope::new("alice", "see you at 5:00"), &mut buf)
            .unwrap();
        assert_eq!(&buf[..], b"alice:see you at 5:00\n");
    }

    #[test]
    fn test_encode_rejects_embedded_newline() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        let err = codec
            .encode(Envelope::new("alice", "two\nlines"), &mut buf)
            .unwrap_err();
        assert!(matches!(err, ProtocolError::Invalid(_)));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_relaying_codec_forwards_carriage_return() {
        let mut strict = FrameCodec::new();
        let mut buf = BytesMut::new();
        let err = strict
            .encode(Envelope::new("alice", "col1\rcol2"), &mut buf)
            .unwrap_err();
        assert!(matches!(err, ProtocolError::Invalid(_)));

        let mut relaying = FrameCodec::new().relaying();
        relaying
            .encode(Envelope::new("al\rice", "col1\rcol2"), &mut buf)
            .unwrap();
        assert_eq!(&buf[..], b"al\rice:col1\rcol2\n");

        let err = relaying
            .encode(Envelope::new("alice", "two\nlines"), &mut buf)
            .unwrap_err();
        assert!(matches!(err, ProtocolError::Invalid(_)));
    }

    #[tokio::test]
    async fn test_framed_halves_over_duplex() {
        let (client, server) = tokio::io::duplex(1024);
        let mut writer = FramedWrite::new(client, FrameCodec::new());
        let mut reader = FramedRead::new(server, FrameCodec::new());

        writer
            .send(Handshake(ClientName::new("alice")))
            .await
            .unwrap();
        writer.send(Envelope::new("bob", "hi")).await.unwrap();
        drop(writer);

        assert_eq!(reader.next().await.unwrap().unwrap(), "alice");
        assert_eq!(reader.next().await.unwrap().unwrap(), "bob:hi");
        assert!(reader.next().await.is_none());
    }
}
