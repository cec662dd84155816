//! Error types for the wire layer.

use thiserror::Error;

/// Convenience type alias for Results using [`ProtocolError`].
pub type Result<T, E = ProtocolError> = std::result::Result<T, E>;

/// Transport-level errors raised by [`LineCodec`](crate::LineCodec).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// I/O error during reading or writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid UTF-8 bytes in a line.
    #[error("invalid UTF-8 in line at byte {byte_pos}")]
    InvalidUtf8 {
        /// Byte position where UTF-8 validation failed.
        byte_pos: usize,
    },

    /// Line exceeded the maximum allowed length.
    #[error("line too long: {actual} bytes (limit: {limit})")]
    MessageTooLong {
        /// Actual line length.
        actual: usize,
        /// Maximum allowed length.
        limit: usize,
    },

    /// Illegal control character in a line.
    #[error("illegal control character: {0:?}")]
    IllegalControlChar(char),
}

/// Errors encountered when parsing IRC messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum MessageParseError {
    /// Message was empty.
    #[error("empty message")]
    EmptyMessage,

    /// Command was invalid or missing.
    #[error("invalid command")]
    InvalidCommand,

    /// Parser stopped at a specific position.
    #[error("parse error at position {position}")]
    Syntax {
        /// Byte offset where parsing failed.
        position: usize,
    },
}

/// Errors decoding a `key=value;` tag block.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TagBlockError {
    /// An entry had nothing before its `=`.
    #[error("empty key in entry {0:?}")]
    EmptyKey(String),

    /// A key contained whitespace or a NUL.
    #[error("invalid key {0:?}")]
    InvalidKey(String),
}
