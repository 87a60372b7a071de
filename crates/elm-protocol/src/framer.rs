//! Line framing for adapter output
//!
//! ELM327 adapters end lines with `\r`, `\r\n` or `\n` depending on the
//! `ATL` setting, and finish every answer with a bare `>` prompt that is
//! never followed by a line terminator.

use tokio_util::bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;

/// Longest undelimited fragment accepted before the stream is rejected
pub const MAX_LINE_LENGTH: usize = 4096;

/// Adapter prompt, sent when the adapter is idle
pub const PROMPT: u8 = b'>';

/// Splits adapter output into text lines.
///
/// Empty lines are skipped. A pending `>` prompt is emitted as its own line.
/// At end of stream an undelimited fragment is dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct ElmLineCodec {
    /// Bytes of `src` already scanned without finding a terminator
    next_index: usize,
}

impl ElmLineCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget scan progress after the buffer was cleared externally
    pub fn reset(&mut self) {
        self.next_index = 0;
    }

    fn take_line(&mut self, src: &mut BytesMut, end: usize) -> String {
        let line = src.split_to(end);
        // Swallow the terminator, treating "\r\n" as one
        let skip = if src.len() >= 2 && &src[..2] == b"\r\n" { 2 } else { 1 };
        src.advance(skip.min(src.len()));
        self.next_index = 0;
        String::from_utf8_lossy(&line).into_owned()
    }
}

impl Decoder for ElmLineCodec {
    type Item = String;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, Self::Error> {
        loop {
            let start = self.next_index.min(src.len());
            let end = src[start..]
                .iter()
                .position(|b| *b == b'\n' || *b == b'\r')
                .map(|offset| start + offset);

            match end {
                Some(end) => {
                    let line = self.take_line(src, end);
                    if line.trim().is_empty() {
                        continue;
                    }
                    return Ok(Some(line));
                }
                None => {
                    if src.iter().any(|b| !b.is_ascii_whitespace())
                        && src.iter().all(|b| *b == PROMPT || b.is_ascii_whitespace())
                    {
                        src.clear();
                        self.next_index = 0;
                        return Ok(Some(">".to_string()));
                    }

                    if src.len() > MAX_LINE_LENGTH {
                        return Err(std::io::Error::new(
                            std::io::ErrorKind::InvalidData,
                            format!("line exceeds {MAX_LINE_LENGTH} bytes without terminator"),
                        ));
                    }

                    self.next_index = src.len();
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<String>, Self::Error> {
        match self.decode(src)? {
            Some(line) => Ok(Some(line)),
            None => {
                if !src.is_empty() {
                    tracing::debug!(
                        bytes = src.len(),
                        "Discarding undelimited fragment at end of stream"
                    );
                    src.clear();
                }
                self.next_index = 0;
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(codec: &mut ElmLineCodec, buf: &mut BytesMut) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(line) = codec.decode(buf).unwrap() {
            lines.push(line);
        }
        lines
    }

    #[test]
    fn test_line_endings() {
        let mut codec = ElmLineCodec::new();
        let mut buf = BytesMut::from(&b"41 0C 1F 88\r\n41 0D 5A\rOK\n"[..]);
        assert_eq!(
            decode_all(&mut codec, &mut buf),
            ["41 0C 1F 88", "41 0D 5A", "OK"]
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn test_partial_line_across_reads() {
        let mut codec = ElmLineCodec::new();
        let mut buf = BytesMut::from(&b"41 0C"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(b" 1F 8");
        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(b"8\r\n");
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("41 0C 1F 88"));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_crlf_split_across_reads() {
        let mut codec = ElmLineCodec::new();
        let mut buf = BytesMut::from(&b"OK\r"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("OK"));

        buf.extend_from_slice(b"\nELM327 v1.5\r");
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("ELM327 v1.5"));
    }

    #[test]
    fn test_empty_lines_skipped() {
        let mut codec = ElmLineCodec::new();
        let mut buf = BytesMut::from(&b"\r\rELM327 v1.5\r\r"[..]);
        assert_eq!(decode_all(&mut codec, &mut buf), ["ELM327 v1.5"]);
    }

    #[test]
    fn test_bare_prompt_is_a_line() {
        let mut codec = ElmLineCodec::new();
        let mut buf = BytesMut::from(&b"OK\r\r>"[..]);
        assert_eq!(decode_all(&mut codec, &mut buf), ["OK", ">"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_eof_discards_partial_line() {
        let mut codec = ElmLineCodec::new();
        let mut buf = BytesMut::from(&b"41 0D 5A\r\n41 0C 1F"[..]);
        assert_eq!(codec.decode_eof(&mut buf).unwrap().as_deref(), Some("41 0D 5A"));
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), None);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_overlong_fragment_is_rejected() {
        let mut codec = ElmLineCodec::new();
        let mut buf = BytesMut::from(&vec![b'A'; MAX_LINE_LENGTH + 1][..]);
        let err = codec.decode(&mut buf).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }
}
