//! DAP wire framing: `Content-Length` header + JSON body.

use crate::error::DapError;

/// Largest header or body a peer may send (4 MiB).
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 4 * 1024 * 1024;

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";
const CONTENT_LENGTH: &str = "Content-Length:";

/// Encode a JSON value into a DAP wire-format message with Content-Length header.
///
/// The announced length is the UTF-8 byte length of the body.
pub fn encode_message(value: &serde_json::Value) -> Result<Vec<u8>, serde_json::Error> {
    let body = serde_json::to_string(value)?;
    let header = format!("Content-Length: {}\r\n\r\n", body.len());
    let mut buf = Vec::with_capacity(header.len() + body.len());
    buf.extend_from_slice(header.as_bytes());
    buf.extend_from_slice(body.as_bytes());
    Ok(buf)
}

/// Parse the Content-Length value from the header section.
fn parse_content_length(header: &str) -> Result<usize, DapError> {
    for line in header.split("\r\n") {
        let line = line.trim();
        if let Some(value) = line.strip_prefix(CONTENT_LENGTH) {
            let value = value.trim();
            return value.parse::<usize>().map_err(|e| {
                DapError::InvalidHeader(format!("invalid Content-Length value '{value}': {e}"))
            });
        }
    }
    Err(DapError::InvalidHeader("missing Content-Length header".into()))
}

/// Incremental decoder for one inbound stream.
///
/// Bytes are appended with [`Framer::push`]; [`Framer::poll_message`]
/// scans for the header terminator one byte at a time and then waits for
/// the announced number of content bytes. A decoded message stays current
/// until [`Framer::consume`] is called, so the same request can be handed
/// out again on a later poll.
#[derive(Debug)]
pub struct Framer {
    buf: Vec<u8>,
    scan_pos: usize,
    header_len: Option<usize>,
    content_length: usize,
    max_size: usize,
}

impl Framer {
    /// Create a framer that rejects headers or bodies of `max_size` bytes or more.
    pub fn new(max_size: usize) -> Self {
        Self {
            buf: Vec::new(),
            scan_pos: 0,
            header_len: None,
            content_length: 0,
            max_size,
        }
    }

    /// Append raw bytes read from the stream.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Whether some bytes of an unfinished message are buffered.
    pub fn has_partial(&self) -> bool {
        !self.buf.is_empty()
    }

    /// How many more bytes may be read before the current message is
    /// complete (or, while the header is unknown, before the header limit).
    pub fn read_room(&self) -> usize {
        match self.header_len {
            Some(start) => (start + self.content_length).saturating_sub(self.buf.len()),
            None => self.max_size.saturating_sub(self.buf.len()),
        }
    }

    /// Try to decode the current message.
    ///
    /// Returns `Ok(None)` when more data is needed. Overflow and broken
    /// headers are fatal: the buffer is discarded and the error returned.
    /// A body that is not UTF-8 is logged and skipped.
    pub fn poll_message(&mut self) -> Result<Option<String>, DapError> {
        loop {
            if self.header_len.is_none() {
                if let Err(e) = self.scan_header() {
                    self.reset();
                    return Err(e);
                }
            }
            let Some(start) = self.header_len else {
                return Ok(None);
            };
            let end = start + self.content_length;
            if self.buf.len() < end {
                return Ok(None);
            }
            match String::from_utf8(self.buf[start..end].to_vec()) {
                Ok(text) => return Ok(Some(text)),
                Err(e) => {
                    tracing::warn!(error = %e, "dropping message with invalid UTF-8 body");
                    self.consume();
                }
            }
        }
    }

    /// Drop the current message and start scanning for the next header.
    pub fn consume(&mut self) {
        if let Some(start) = self.header_len {
            let end = (start + self.content_length).min(self.buf.len());
            self.buf.drain(..end);
        }
        self.scan_pos = 0;
        self.header_len = None;
        self.content_length = 0;
    }

    fn scan_header(&mut self) -> Result<(), DapError> {
        while self.scan_pos < self.buf.len() {
            self.scan_pos += 1;
            if self.buf[..self.scan_pos].ends_with(HEADER_TERMINATOR) {
                let raw = &self.buf[..self.scan_pos - HEADER_TERMINATOR.len()];
                let header = std::str::from_utf8(raw)
                    .map_err(|e| DapError::InvalidHeader(format!("invalid UTF-8: {e}")))?;
                let content_length = parse_content_length(header)?;
                if content_length >= self.max_size {
                    return Err(DapError::BufferOverflow {
                        what: "content",
                        limit: self.max_size,
                    });
                }
                self.header_len = Some(self.scan_pos);
                self.content_length = content_length;
                return Ok(());
            }
            if self.scan_pos >= self.max_size {
                return Err(DapError::BufferOverflow {
                    what: "header",
                    limit: self.max_size,
                });
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.buf.clear();
        self.scan_pos = 0;
        self.header_len = None;
        self.content_length = 0;
    }
}

impl Default for Framer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BUFFER_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(framer: &mut Framer) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(msg) = framer.poll_message().unwrap() {
            out.push(msg);
            framer.consume();
        }
        out
    }

    fn sample_stream() -> Vec<u8> {
        let mut bytes =
            encode_message(&serde_json::json!({"seq": 1, "command": "initialize"})).unwrap();
        bytes.extend(encode_message(
            &serde_json::json!({"seq": 2, "command": "threads", "note": "héllo"}),
        )
        .unwrap());
        bytes.extend(encode_message(&serde_json::json!({"seq": 3, "command": "next"})).unwrap());
        bytes
    }

    #[test]
    fn framing_encode_request() {
        let req = serde_json::json!({
            "seq": 1,
            "type": "request",
            "command": "initialize",
            "arguments": {
                "adapterID": "scriptdap"
            }
        });
        let encoded = encode_message(&req).unwrap();
        let s = String::from_utf8(encoded.clone()).unwrap();
        assert!(s.starts_with("Content-Length: "));
        assert!(s.contains("\r\n\r\n"));

        let mut framer = Framer::default();
        framer.push(&encoded);
        let decoded: serde_json::Value =
            serde_json::from_str(&framer.poll_message().unwrap().unwrap()).unwrap();
        assert_eq!(decoded, req);
    }

    #[test]
    fn framing_length_counts_utf8_bytes() {
        let encoded = encode_message(&serde_json::json!({"output": "ü"})).unwrap();
        let s = String::from_utf8(encoded).unwrap();
        let (header, body) = s.split_once("\r\n\r\n").unwrap();
        assert_eq!(header, format!("Content-Length: {}", body.len()));
        assert_ne!(body.len(), body.chars().count());
    }

    #[test]
    fn framing_chunking_does_not_change_messages() {
        let stream = sample_stream();
        let mut whole = Framer::default();
        whole.push(&stream);
        let expected = drain(&mut whole);
        assert_eq!(expected.len(), 3);

        for chunk_size in [1, 2, 3, 7, 16, 33, stream.len()] {
            let mut framer = Framer::default();
            let mut got = Vec::new();
            for chunk in stream.chunks(chunk_size) {
                framer.push(chunk);
                got.extend(drain(&mut framer));
            }
            assert_eq!(got, expected, "chunk size {chunk_size}");
            assert!(!framer.has_partial());
        }
    }

    #[test]
    fn framing_partial_body_needs_more_data() {
        let mut framer = Framer::default();
        framer.push(b"Content-Length: 5\r\n\r\n{\"a\"");
        assert_eq!(framer.poll_message().unwrap(), None);
        assert_eq!(framer.read_room(), 1);

        framer.push(b":1");
        // Only 5 bytes belong to the message.
        assert_eq!(framer.poll_message().unwrap(), Some("{\"a\":".to_string()));
    }

    #[test]
    fn framing_three_of_five_bytes_then_rest() {
        let mut framer = Framer::default();
        framer.push(b"Content-Length: 5\r\n\r\nabc");
        assert_eq!(framer.poll_message().unwrap(), None);
        framer.push(b"de");
        assert_eq!(framer.poll_message().unwrap(), Some("abcde".to_string()));
    }

    #[test]
    fn framing_message_stays_current_until_consumed() {
        let mut framer = Framer::default();
        framer.push(&encode_message(&serde_json::json!({"command": "stackTrace"})).unwrap());
        let first = framer.poll_message().unwrap();
        let again = framer.poll_message().unwrap();
        assert!(first.is_some());
        assert_eq!(first, again);
        framer.consume();
        assert_eq!(framer.poll_message().unwrap(), None);
        assert!(!framer.has_partial());
    }

    #[test]
    fn framing_missing_content_length_is_fatal() {
        let mut framer = Framer::default();
        framer.push(b"Bad-Header: 42\r\n\r\n{}");
        let err = framer.poll_message().unwrap_err();
        assert!(
            err.to_string().contains("missing Content-Length"),
            "got: {err}"
        );
    }

    #[test]
    fn framing_header_overflow_is_fatal() {
        let mut framer = Framer::new(16);
        framer.push(b"Content-Length: 12345678901234567890");
        let err = framer.poll_message().unwrap_err();
        assert!(matches!(err, DapError::BufferOverflow { what: "header", .. }));
        assert!(!framer.has_partial());
    }

    #[test]
    fn framing_content_overflow_is_fatal() {
        let mut framer = Framer::new(64);
        framer.push(b"Content-Length: 64\r\n\r\n");
        let err = framer.poll_message().unwrap_err();
        assert!(matches!(
            err,
            DapError::BufferOverflow {
                what: "content",
                limit: 64
            }
        ));
    }

    #[test]
    fn framing_header_split_across_terminator() {
        let mut framer = Framer::default();
        framer.push(b"Content-Length: 2\r\n");
        assert_eq!(framer.poll_message().unwrap(), None);
        assert_eq!(framer.read_room(), DEFAULT_MAX_BUFFER_SIZE - 19);
        framer.push(b"\r");
        assert_eq!(framer.poll_message().unwrap(), None);
        framer.push(b"\n{}");
        assert_eq!(framer.poll_message().unwrap(), Some("{}".to_string()));
    }

    #[test]
    fn framing_invalid_utf8_body_is_skipped() {
        let mut framer = Framer::default();
        framer.push(b"Content-Length: 2\r\n\r\n\xff\xfe");
        framer.push(b"Content-Length: 2\r\n\r\n{}");
        assert_eq!(framer.poll_message().unwrap(), Some("{}".to_string()));
        framer.consume();
        assert!(!framer.has_partial());
    }

    #[test]
    fn framing_read_room_covers_header_and_body() {
        let mut framer = Framer::new(64);
        assert_eq!(framer.read_room(), 64);
        framer.push(b"Content-Length: 60\r\n\r\n");
        assert_eq!(framer.poll_message().unwrap(), None);
        // Header (22 bytes) plus body may exceed the limit; only the body is capped.
        assert_eq!(framer.read_room(), 60);
        framer.push(&[b'a'; 60]);
        assert_eq!(framer.read_room(), 0);
        assert_eq!(framer.poll_message().unwrap().map(|m| m.len()), Some(60));
    }
}
