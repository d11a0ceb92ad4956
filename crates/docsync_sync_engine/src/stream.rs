//! Incremental decoder for a JSON array arriving as a byte stream.
//!
//! Only one element is buffered at a time. The reader scans raw bytes to
//! find where the next element ends, tracking nesting depth and string
//! escapes, then hands that slice to `serde_json`.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReaderState {
    /// Nothing read yet; expecting `[`.
    Start,
    /// After `[`; expecting an element or `]`.
    First,
    /// After an element; expecting `,` or `]`.
    Next,
    /// After `]`.
    Done,
}

/// Reads the elements of one top-level JSON array.
///
/// Every failure to read the stream as an array of JSON values (wrong
/// top-level type, syntax error, element over the size limit, trailing
/// content) is reported as [`SyncError::BadRequest`]. I/O failures of the
/// underlying reader are reported as [`SyncError::Io`].
#[derive(Debug)]
pub struct JsonArrayReader<R> {
    reader: BufReader<R>,
    max_item_bytes: usize,
    state: ReaderState,
    position: usize,
}

impl<R: AsyncRead + Unpin> JsonArrayReader<R> {
    /// Creates a reader using the limits in `config`.
    pub fn new(source: R, config: &SyncConfig) -> Self {
        Self {
            reader: BufReader::with_capacity(config.read_buffer_size, source),
            max_item_bytes: config.max_item_bytes,
            state: ReaderState::Start,
            position: 0,
        }
    }

    /// Returns the number of elements decoded so far.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Decodes the next element, or returns `None` after the closing `]`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::BadRequest`] if the stream is not a well-formed
    /// JSON array, and [`SyncError::Io`] if reading fails.
    pub async fn next_item(&mut self) -> SyncResult<Option<Value>> {
        loop {
            match self.state {
                ReaderState::Done => return Ok(None),
                ReaderState::Start => match self.peek().await? {
                    Some(b'[') => {
                        self.reader.consume(1);
                        self.state = ReaderState::First;
                    }
                    Some(_) => return Err(SyncError::bad_request("request body must be a JSON array")),
                    None => return Err(SyncError::bad_request("request body is empty")),
                },
                ReaderState::First => match self.peek().await? {
                    Some(b']') => return self.finish().await,
                    Some(_) => return self.element().await.map(Some),
                    None => return Err(unexpected_end()),
                },
                ReaderState::Next => match self.peek().await? {
                    Some(b']') => return self.finish().await,
                    Some(b',') => {
                        self.reader.consume(1);
                        match self.peek().await? {
                            Some(b']') => return Err(SyncError::bad_request("trailing comma in array")),
                            Some(_) => return self.element().await.map(Some),
                            None => return Err(unexpected_end()),
                        }
                    }
                    Some(other) => {
                        return Err(SyncError::bad_request(format!(
                            "expected ',' or ']' after element {}, found '{}'",
                            self.position,
                            char::from(other)
                        )))
                    }
                    None => return Err(unexpected_end()),
                },
            }
        }
    }

    /// Consumes the closing `]` and checks nothing but whitespace follows.
    async fn finish(&mut self) -> SyncResult<Option<Value>> {
        self.reader.consume(1);
        self.state = ReaderState::Done;
        match self.peek().await? {
            None => Ok(None),
            Some(_) => Err(SyncError::bad_request("unexpected content after the array")),
        }
    }

    async fn element(&mut self) -> SyncResult<Value> {
        let bytes = self.scan_element().await?;
        let value = serde_json::from_slice(&bytes).map_err(|e| {
            SyncError::bad_request(format!("invalid JSON in element {}: {e}", self.position))
        })?;
        self.position += 1;
        self.state = ReaderState::Next;
        Ok(value)
    }

    /// Skips whitespace and returns the next byte without consuming it.
    async fn peek(&mut self) -> SyncResult<Option<u8>> {
        loop {
            let buf = self.reader.fill_buf().await?;
            if buf.is_empty() {
                return Ok(None);
            }
            match buf.iter().position(|b| !b.is_ascii_whitespace()) {
                Some(index) => {
                    let byte = buf[index];
                    self.reader.consume(index);
                    return Ok(Some(byte));
                }
                None => {
                    let len = buf.len();
                    self.reader.consume(len);
                }
            }
        }
    }

    /// Collects the raw bytes of one element.
    async fn scan_element(&mut self) -> SyncResult<Vec<u8>> {
        let mut scanner = ElementScanner::default();
        let mut out = Vec::new();
        loop {
            let (used, complete) = {
                let buf = self.reader.fill_buf().await?;
                if buf.is_empty() {
                    if scanner.is_scalar_in_progress() && !out.is_empty() {
                        return Ok(out);
                    }
                    return Err(unexpected_end());
                }
                let (used, complete) = scanner.scan(buf);
                out.extend_from_slice(&buf[..used]);
                (used, complete)
            };
            self.reader.consume(used);

            if out.len() > self.max_item_bytes {
                return Err(SyncError::bad_request(format!(
                    "element {} exceeds the {} byte limit",
                    self.position, self.max_item_bytes
                )));
            }
            if complete {
                return Ok(out);
            }
        }
    }
}

fn unexpected_end() -> SyncError {
    SyncError::bad_request("unexpected end of input inside the array")
}

/// Finds the end of one JSON value in a byte stream.
#[derive(Debug, Default)]
struct ElementScanner {
    depth: usize,
    in_string: bool,
    escaped: bool,
}

impl ElementScanner {
    /// Scans `buf`, returning how many bytes belong to the element and
    /// whether the element is complete.
    fn scan(&mut self, buf: &[u8]) -> (usize, bool) {
        for (index, &byte) in buf.iter().enumerate() {
            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if byte == b'\\' {
                    self.escaped = true;
                } else if byte == b'"' {
                    self.in_string = false;
                    if self.depth == 0 {
                        return (index + 1, true);
                    }
                }
                continue;
            }
            match byte {
                b'"' => self.in_string = true,
                b'{' | b'[' => self.depth += 1,
                b'}' | b']' if self.depth == 0 => return (index, true),
                b'}' | b']' => {
                    self.depth -= 1;
                    if self.depth == 0 {
                        return (index + 1, true);
                    }
                }
                b',' if self.depth == 0 => return (index, true),
                byte if self.depth == 0 && byte.is_ascii_whitespace() => return (index, true),
                _ => {}
            }
        }
        (buf.len(), false)
    }

    /// True while reading a bare scalar (number, literal) at the top level.
    fn is_scalar_in_progress(&self) -> bool {
        self.depth == 0 && !self.in_string
    }
}
