/// Line codec — frames the TCP byte stream into protocol lines.
///
/// Inbound: splits on `\n`, strips an optional trailing `\r` so both
/// `nc` and telnet-style clients work, and yields the raw line text.
/// Outbound: serializes [`Reply`] lines with `\n` termination, plus the
/// bare `"> "` prompt marker, which carries no terminator at all.
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::reply::Reply;

/// Maximum inbound line length (excluding the terminator).
const MAX_LINE_LENGTH: usize = 4096;

/// Codec error: a framing failure or an I/O error.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("line exceeds maximum length ({MAX_LINE_LENGTH} bytes)")]
    LineTooLong,
    #[error("line is not valid UTF-8")]
    Utf8(#[from] std::str::Utf8Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// An outbound frame: a reply line or the prompt marker.
#[derive(Debug, Clone)]
pub enum Outbound {
    Line(Reply),
    Prompt,
}

/// A tokio codec that frames chat protocol lines on `\n` boundaries.
#[derive(Debug, Default)]
pub struct LineCodec;

impl Decoder for LineCodec {
    type Item = String;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match src.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                // Extract the line (without \n), advance the buffer.
                let line_bytes = src.split_to(pos);
                src.advance(1);

                let line = std::str::from_utf8(&line_bytes)?;
                Ok(Some(line.strip_suffix('\r').unwrap_or(line).to_owned()))
            }
            None => {
                // No complete line yet. Check if the buffer is getting too large.
                if src.len() > MAX_LINE_LENGTH {
                    return Err(CodecError::LineTooLong);
                }
                Ok(None)
            }
        }
    }
}

impl Encoder<Outbound> for LineCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Outbound, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Outbound::Line(reply) => {
                let wire = reply.to_wire();
                dst.reserve(wire.len() + 1);
                dst.put_slice(wire.as_bytes());
                dst.put_u8(b'\n');
            }
            Outbound::Prompt => dst.put_slice(b"> "),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::reply::Category;
    use bytes::BytesMut;

    // ── Decoder ──────────────────────────────────────────────────

    #[test]
    fn decode_complete_line() {
        let mut codec = LineCodec;
        let mut buf = BytesMut::from("REGISTER alice\n");
        let line = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(line, "REGISTER alice");
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_strips_carriage_return() {
        let mut codec = LineCodec;
        let mut buf = BytesMut::from("REGISTER alice\r\n");
        let line = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(line, "REGISTER alice");
    }

    #[test]
    fn decode_partial_line_then_complete() {
        let mut codec = LineCodec;
        let mut buf = BytesMut::from("REGIS");

        // Not enough data yet.
        assert!(codec.decode(&mut buf).unwrap().is_none());

        // More data arrives.
        buf.extend_from_slice(b"TER alice\n");
        let line = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(line, "REGISTER alice");
    }

    #[test]
    fn decode_two_lines_in_one_read() {
        let mut codec = LineCodec;
        let mut buf = BytesMut::from("JOIN team\nSTATUS\n");

        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), "JOIN team");
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), "STATUS");
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_rejects_oversized_line() {
        let mut codec = LineCodec;
        let mut buf = BytesMut::from(vec![b'A'; MAX_LINE_LENGTH + 1].as_slice());
        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, CodecError::LineTooLong));
    }

    #[test]
    fn decode_rejects_invalid_utf8() {
        let mut codec = LineCodec;
        let mut buf = BytesMut::from(&[0xff, 0xfe, b'\n'][..]);
        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, CodecError::Utf8(_)));
    }

    #[test]
    fn decode_empty_buffer() {
        let mut codec = LineCodec;
        let mut buf = BytesMut::new();
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    // ── Encoder ──────────────────────────────────────────────────

    #[test]
    fn encode_line_appends_newline() {
        let mut codec = LineCodec;
        let mut buf = BytesMut::new();
        let reply = Reply::new(200, Category::Ok, "REGISTERED").arg("alice");
        codec.encode(Outbound::Line(reply), &mut buf).unwrap();
        assert_eq!(&buf[..], b"200 OK REGISTERED alice\n");
    }

    #[test]
    fn encode_prompt_has_no_newline() {
        let mut codec = LineCodec;
        let mut buf = BytesMut::new();
        codec.encode(Outbound::Prompt, &mut buf).unwrap();
        assert_eq!(&buf[..], b"> ");
    }
}
