//! Streaming MBOX reader and message source.
//!
//! Reads line-by-line through a 1 MB buffer and yields one record at a time.
//! Never loads the entire file into memory and never seeks backwards.
//! Tolerant of malformed input.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{ContactError, Result};
use crate::model::message::Message;
use crate::parser::mime::MessageDecoder;

/// Size of the internal read buffer (1 MB for fast sequential reads on modern SSDs).
const READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Default maximum message size in bytes (64 MB). Larger messages are truncated.
const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// One undecoded message: everything from its `From ` line to the next separator.
#[derive(Debug, Clone)]
pub struct RawMessage {
    /// Byte offset of the `From ` separator line.
    pub offset: u64,
    pub bytes: Vec<u8>,
}

/// Forward-only iterator over the raw messages of an MBOX stream.
///
/// Tolerates:
/// - Mixed `\n` and `\r\n` line endings
/// - `From ` lines not preceded by a blank line (logs a warning)
/// - Truncated messages at EOF
/// - NUL bytes and other binary content in the body
/// - UTF-8 BOM at the start of the file
///
/// An I/O error is yielded once and ends the iteration.
pub struct MboxReader<R> {
    reader: R,
    path: PathBuf,
    position: u64,
    message_start: u64,
    message_buf: Vec<u8>,
    line_buf: Vec<u8>,
    prev_line_was_empty: bool,
    first_line: bool,
    oversized: bool,
    max_message_size: usize,
    finished: bool,
}

impl MboxReader<BufReader<File>> {
    /// Open an MBOX file for streaming.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ContactError::FileNotFound(path.clone())
            } else {
                ContactError::io(&path, e)
            }
        })?;
        Ok(Self::new(BufReader::with_capacity(READ_BUFFER_SIZE, file), path))
    }
}

impl<R: BufRead> MboxReader<R> {
    /// Wrap any buffered reader. `path` is only used in error messages.
    pub fn new(reader: R, path: impl Into<PathBuf>) -> Self {
        Self {
            reader,
            path: path.into(),
            position: 0,
            message_start: 0,
            message_buf: Vec::with_capacity(64 * 1024),
            line_buf: Vec::with_capacity(4096),
            prev_line_was_empty: true,
            first_line: true,
            oversized: false,
            max_message_size: MAX_MESSAGE_SIZE,
            finished: false,
        }
    }

    /// Override the per-message size limit.
    pub fn with_max_message_size(mut self, max: usize) -> Self {
        self.max_message_size = max;
        self
    }

    /// Bytes consumed so far (for progress reporting).
    pub fn position(&self) -> u64 {
        self.position
    }

    fn take_message(&mut self) -> RawMessage {
        self.oversized = false;
        RawMessage {
            offset: self.message_start,
            bytes: std::mem::take(&mut self.message_buf),
        }
    }
}

impl<R: BufRead> Iterator for MboxReader<R> {
    type Item = Result<RawMessage>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            self.line_buf.clear();
            let line_len = match self.reader.read_until(b'\n', &mut self.line_buf) {
                Ok(n) => n as u64,
                Err(e) => {
                    self.finished = true;
                    return Some(Err(ContactError::io(&self.path, e)));
                }
            };

            if line_len == 0 {
                // EOF: flush the last message
                self.finished = true;
                if self.message_buf.is_empty() {
                    return None;
                }
                return Some(Ok(self.take_message()));
            }

            let line_start = self.position;
            self.position += line_len;

            if is_mbox_separator(&self.line_buf) {
                if !self.first_line && !self.prev_line_was_empty {
                    warn!(
                        offset = line_start,
                        "Found 'From ' separator without preceding blank line"
                    );
                }
                self.first_line = false;
                self.prev_line_was_empty = false;

                let finished = (!self.message_buf.is_empty()).then(|| self.take_message());
                self.message_start = line_start;
                self.message_buf.extend_from_slice(&self.line_buf);
                if let Some(message) = finished {
                    return Some(Ok(message));
                }
                continue;
            }

            if self.message_buf.len() + self.line_buf.len() <= self.max_message_size {
                self.message_buf.extend_from_slice(&self.line_buf);
            } else if !self.oversized {
                // Warn once per message
                warn!(
                    offset = self.message_start,
                    max_size = self.max_message_size,
                    "Message exceeds maximum size, truncating body"
                );
                self.oversized = true;
            }

            self.prev_line_was_empty = is_blank_line(&self.line_buf);
            self.first_line = false;
        }
    }
}

/// Message source over an MBOX file: raw records decoded into [`Message`]s.
///
/// A record that cannot be decoded is yielded as
/// [`ContactError::MalformedMessage`] and the stream continues.
pub struct MboxSource<R> {
    reader: MboxReader<R>,
    decoder: MessageDecoder,
}

impl MboxSource<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>, decoder: MessageDecoder) -> Result<Self> {
        Ok(Self {
            reader: MboxReader::open(path)?,
            decoder,
        })
    }
}

impl<R: BufRead> MboxSource<R> {
    pub fn new(reader: MboxReader<R>, decoder: MessageDecoder) -> Self {
        Self { reader, decoder }
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> u64 {
        self.reader.position()
    }
}

impl<R: BufRead> Iterator for MboxSource<R> {
    type Item = Result<Message>;

    fn next(&mut self) -> Option<Self::Item> {
        let raw = self.reader.next()?;
        Some(raw.and_then(|raw| self.decoder.decode(raw.offset, &raw.bytes)))
    }
}

/// Check whether a line is an MBOX separator (`From ` at the start).
fn is_mbox_separator(line: &[u8]) -> bool {
    let line = line.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(line);
    line.starts_with(b"From ")
}

/// Check whether a line is blank (empty or only whitespace / CR / LF).
fn is_blank_line(line: &[u8]) -> bool {
    line.iter()
        .all(|&b| b == b'\n' || b == b'\r' || b == b' ' || b == b'\t')
}
