//! Line-based codec for tokio.
//!
//! Reads newline-terminated lines with the trailing `\r\n` removed and
//! writes lines with `\r\n` appended.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{ProtocolError, Result};

/// Line-based codec that handles newline-terminated messages.
///
/// By default, lines are limited to 512 bytes (IRC standard).
#[derive(Debug)]
pub struct LineCodec {
    /// Index of next byte to check for newline
    next_index: usize,
    /// Maximum line length, terminator included
    max_len: usize,
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl LineCodec {
    /// Default maximum line length.
    pub const DEFAULT_MAX_LEN: usize = 512;

    /// Create a codec with the IRC standard length limit.
    pub fn new() -> Self {
        Self {
            next_index: 0,
            max_len: Self::DEFAULT_MAX_LEN,
        }
    }

    /// Create a codec with a custom max line length.
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            next_index: 0,
            max_len,
        }
    }

    fn validate_line(s: &str) -> Result<()> {
        match s.chars().find(|&c| c == '\0') {
            Some(c) => Err(ProtocolError::IllegalControlChar(c)),
            None => Ok(()),
        }
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>> {
        let Some(offset) = src[self.next_index..].iter().position(|b| *b == b'\n') else {
            // No complete line yet - remember where we stopped
            self.next_index = src.len();
            if src.len() > self.max_len {
                return Err(ProtocolError::MessageTooLong {
                    actual: src.len(),
                    limit: self.max_len,
                });
            }
            return Ok(None);
        };

        let line = src.split_to(self.next_index + offset + 1);
        self.next_index = 0;

        if line.len() > self.max_len {
            return Err(ProtocolError::MessageTooLong {
                actual: line.len(),
                limit: self.max_len,
            });
        }

        let data = std::str::from_utf8(&line).map_err(|e| ProtocolError::InvalidUtf8 {
            byte_pos: e.valid_up_to(),
        })?;
        let data = data.trim_end_matches(['\r', '\n']);
        Self::validate_line(data)?;

        Ok(Some(data.to_string()))
    }
}

impl Encoder<String> for LineCodec {
    type Error = ProtocolError;

    fn encode(&mut self, line: String, dst: &mut BytesMut) -> Result<()> {
        dst.reserve(line.len() + 2);
        dst.extend_from_slice(line.as_bytes());
        if !line.ends_with("\r\n") {
            dst.extend_from_slice(b"\r\n");
        }
        Ok(())
    }
}
