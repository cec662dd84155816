//! The `BOUNCER` tag block: `key1=value1;key2=value2;`.
//!
//! This format is not the IRCv3 message-tags section. Values are opaque
//! and nothing is escaped, so a value can never contain `;`, and a key can
//! never contain `=`. That limitation is part of the wire contract with
//! existing clients; keep every producer and consumer of the format behind
//! this module.

use std::fmt::Write;

use crate::error::TagBlockError;

/// A decoded tag block.
///
/// A bare `key` decodes as present with an empty value, so `get` returns
/// `Some("")` for it. When a key repeats, the last occurrence wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagBlock {
    entries: Vec<(String, String)>,
}

impl TagBlock {
    /// Decode a tag block.
    ///
    /// Empty entries (`a=1;;b=2`, trailing `;`) are skipped.
    pub fn parse(raw: &str) -> Result<Self, TagBlockError> {
        let mut entries = Vec::new();

        for entry in raw.split(';') {
            if entry.is_empty() {
                continue;
            }

            let (key, value) = match entry.split_once('=') {
                Some((key, value)) => (key, value),
                None => (entry, ""),
            };

            if key.is_empty() {
                return Err(TagBlockError::EmptyKey(entry.to_string()));
            }
            if key.chars().any(|c| c.is_whitespace() || c == '\0') {
                return Err(TagBlockError::InvalidKey(key.to_string()));
            }

            entries.push((key.to_string(), value.to_string()));
        }

        Ok(Self { entries })
    }

    /// Value for `key`, if the key was present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Whether `key` was present, with or without a value.
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Value for `key`, or `default` when absent.
    pub fn value_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// Value for `key` when present and non-empty.
    pub fn non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.is_empty())
    }

    /// Number of decoded entries, duplicates included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the block had no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Builds a tag block field by field, in call order.
///
/// ```
/// use bnc_proto::TagBlockWriter;
///
/// let block = TagBlockWriter::new()
///     .field("network", "libera")
///     .field("port", 6697)
///     .finish();
/// assert_eq!(block, "network=libera;port=6697;");
/// ```
#[derive(Debug, Clone, Default)]
pub struct TagBlockWriter {
    buf: String,
}

impl TagBlockWriter {
    /// Start an empty block.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `key=value;`.
    #[must_use]
    pub fn field(mut self, key: &str, value: impl std::fmt::Display) -> Self {
        // Writing into a String cannot fail.
        let _ = write!(self.buf, "{}={};", key, value);
        self
    }

    /// Append a field only when `value` is `Some`.
    #[must_use]
    pub fn field_opt(self, key: &str, value: Option<impl std::fmt::Display>) -> Self {
        match value {
            Some(value) => self.field(key, value),
            None => self,
        }
    }

    /// The encoded block.
    pub fn finish(self) -> String {
        self.buf
    }
}
