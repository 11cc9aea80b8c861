//! Newline framing for relay connections
//!
//! Splits the TCP byte stream on `\n` (a trailing `\r` is dropped) and
//! writes each outbound line with a single `\n`. Bytes are decoded lossily
//! so one bad byte never costs a client its connection.
//!
//! Oversized lines are skipped (logged + discarded) instead of returning a
//! fatal error.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, warn};

/// Default maximum line length in bytes, excluding the terminator
pub const DEFAULT_MAX_LINE_LENGTH: usize = 8192;

/// A tokio codec that frames relay lines on `\n` boundaries.
#[derive(Debug)]
pub struct LineCodec {
    max_length: usize,
    /// Bytes already scanned for `\n` in the current buffer.
    next_index: usize,
    /// True while discarding an oversized line until its terminator shows up.
    skipping: bool,
}

impl LineCodec {
    pub fn new() -> Self {
        Self::with_max_length(DEFAULT_MAX_LINE_LENGTH)
    }

    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            max_length,
            next_index: 0,
            skipping: false,
        }
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let newline = src[self.next_index..]
                .iter()
                .position(|b| *b == b'\n')
                .map(|pos| pos + self.next_index);

            match newline {
                Some(pos) if self.skipping => {
                    warn!(bytes = pos + 1, "codec: finished skipping oversized line tail");
                    src.advance(pos + 1);
                    self.next_index = 0;
                    self.skipping = false;
                }
                Some(pos) if pos > self.max_length => {
                    warn!(bytes = pos, "codec: skipped oversized line");
                    src.advance(pos + 1);
                    self.next_index = 0;
                }
                Some(pos) => {
                    let frame = src.split_to(pos + 1);
                    self.next_index = 0;
                    let mut line = &frame[..pos];
                    if let [rest @ .., b'\r'] = line {
                        line = rest;
                    }
                    return Ok(Some(String::from_utf8_lossy(line).into_owned()));
                }
                None if self.skipping => {
                    src.clear();
                    self.next_index = 0;
                    return Ok(None);
                }
                None if src.len() > self.max_length => {
                    warn!(bytes = src.len(), "codec: discarding oversized line");
                    src.clear();
                    self.next_index = 0;
                    self.skipping = true;
                    return Ok(None);
                }
                None => {
                    self.next_index = src.len();
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }
        if !src.is_empty() {
            debug!(bytes = src.len(), "codec: dropping unterminated line at end of stream");
            src.clear();
        }
        self.next_index = 0;
        Ok(None)
    }
}

impl Encoder<String> for LineCodec {
    type Error = std::io::Error;

    fn encode(&mut self, line: String, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(line.len() + 1);
        dst.put_slice(line.as_bytes());
        dst.put_u8(b'\n');
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(codec: &mut LineCodec, buf: &mut BytesMut) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(line) = codec.decode(buf).unwrap() {
            lines.push(line);
        }
        lines
    }

    #[test]
    fn test_partial_reads_are_rejoined() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from("Ali");
        assert!(decode_all(&mut codec, &mut buf).is_empty());

        buf.extend_from_slice(b"ce\r\nALL:1:hi\nBo");
        assert_eq!(decode_all(&mut codec, &mut buf), vec!["Alice", "ALL:1:hi"]);

        buf.extend_from_slice(b"b\n");
        assert_eq!(decode_all(&mut codec, &mut buf), vec!["Bob"]);
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"ALL:1:caf\xff\n"[..]);
        assert_eq!(decode_all(&mut codec, &mut buf), vec!["ALL:1:caf\u{fffd}"]);
    }

    #[test]
    fn test_oversized_line_is_skipped() {
        let mut codec = LineCodec::with_max_length(8);
        let mut buf = BytesMut::from("this line is far too long");
        assert!(decode_all(&mut codec, &mut buf).is_empty());

        buf.extend_from_slice(b" still going\nok\n");
        assert_eq!(decode_all(&mut codec, &mut buf), vec!["ok"]);
    }

    #[test]
    fn test_complete_oversized_line_is_skipped() {
        let mut codec = LineCodec::with_max_length(4);
        let mut buf = BytesMut::from("toolong\nfine\n");
        assert_eq!(decode_all(&mut codec, &mut buf), vec!["fine"]);
    }

    #[test]
    fn test_eof_drops_partial_line() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from("done\npartial");
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), Some("done".to_string()));
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), None);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_encode_appends_newline() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::new();
        codec.encode("USERS|System|ALL|Alice".to_string(), &mut buf).unwrap();
        assert_eq!(&buf[..], b"USERS|System|ALL|Alice\n");
    }
}
