//! Per-network conversation buffers.

use bnc_proto::irc_to_lower;
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::BTreeMap;

/// Format a last-seen instant the way it travels on the wire.
pub fn format_seen(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse an RFC 3339 instant and normalize it to UTC.
pub fn parse_seen(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw).map(|ts| ts.with_timezone(&Utc))
}

/// A tracked conversation target: a channel or a private query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Buffer {
    /// Name as first seen (case preserved).
    pub name: String,
    /// Whether this buffer is a channel.
    pub channel: bool,
    /// Read watermark. Only moves through [`Buffer::set_last_seen`].
    last_seen: DateTime<Utc>,
    /// Last known channel topic.
    pub topic: String,
    /// Whether the upstream session is currently joined (channels only).
    pub joined: bool,
}

impl Buffer {
    pub fn new(name: impl Into<String>, channel: bool) -> Self {
        Self {
            name: name.into(),
            channel,
            last_seen: DateTime::<Utc>::default(),
            topic: String::new(),
            joined: false,
        }
    }

    pub fn last_seen(&self) -> DateTime<Utc> {
        self.last_seen
    }

    pub fn set_last_seen(&mut self, ts: DateTime<Utc>) {
        self.last_seen = ts;
    }
}

/// Buffers of one network, keyed by case-folded name.
#[derive(Debug, Default)]
pub struct BufferDirectory {
    buffers: BTreeMap<String, Buffer>,
}

impl BufferDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Buffer> {
        self.buffers.get(&irc_to_lower(name))
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Buffer> {
        self.buffers.get_mut(&irc_to_lower(name))
    }

    /// Insert a buffer, replacing any buffer with the same folded name.
    pub fn insert(&mut self, buffer: Buffer) {
        self.buffers.insert(irc_to_lower(&buffer.name), buffer);
    }

    /// Remove a buffer. Absent names are a no-op.
    pub fn remove(&mut self, name: &str) -> Option<Buffer> {
        self.buffers.remove(&irc_to_lower(name))
    }

    /// Get a buffer, creating it if needed. The flag tells whether it was created.
    pub fn touch(&mut self, name: &str, channel: bool) -> (&mut Buffer, bool) {
        let key = irc_to_lower(name);
        let created = !self.buffers.contains_key(&key);
        let buffer = self
            .buffers
            .entry(key)
            .or_insert_with(|| Buffer::new(name, channel));
        (buffer, created)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Buffer> {
        self.buffers.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Buffer> {
        self.buffers.values_mut()
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}
