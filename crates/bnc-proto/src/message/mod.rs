//! Owned IRC messages.

mod parse;
mod serialize;

use std::str::FromStr;

use crate::error::MessageParseError;

/// An owned IRC message.
///
/// Parameters are kept as raw strings; the bouncer only needs the command
/// name and positional arguments, never typed command variants.
///
/// # Example
///
/// ```
/// use bnc_proto::Message;
///
/// let msg: Message = ":irc.example.net 001 alice :Welcome".parse().unwrap();
/// assert_eq!(msg.command, "001");
/// assert_eq!(msg.arg(0), Some("alice"));
///
/// let reply = Message::new("BOUNCER", ["listnetworks", "end"]);
/// assert_eq!(reply.to_string(), "BOUNCER listnetworks end");
/// ```
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Message {
    /// Raw IRCv3 tags section (without the leading `@`).
    pub tags: Option<String>,
    /// Message source (without the leading `:`).
    pub prefix: Option<String>,
    /// Command name or three-digit numeric, as received.
    pub command: String,
    /// Positional parameters, trailing parameter included.
    pub params: Vec<String>,
}

impl Message {
    /// Create a message without tags or prefix.
    pub fn new<I, S>(command: &str, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tags: None,
            prefix: None,
            command: command.to_string(),
            params: params.into_iter().map(Into::into).collect(),
        }
    }

    /// Set the message source.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Get the nth parameter, if present.
    pub fn arg(&self, n: usize) -> Option<&str> {
        self.params.get(n).map(String::as_str)
    }

    /// Case-insensitive command comparison.
    pub fn is_command(&self, command: &str) -> bool {
        self.command.eq_ignore_ascii_case(command)
    }

    /// Nickname part of a `nick!user@host` source, if any.
    pub fn source_nickname(&self) -> Option<&str> {
        let prefix = self.prefix.as_deref()?;
        let end = prefix.find(['!', '@']).unwrap_or(prefix.len());
        Some(&prefix[..end])
    }
}

impl FromStr for Message {
    type Err = MessageParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let line = s.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return Err(MessageParseError::EmptyMessage);
        }

        let parsed = parse::ParsedMessage::parse(line)?;
        Ok(Self {
            tags: parsed.tags.map(str::to_string),
            prefix: parsed.prefix.map(str::to_string),
            command: parsed.command.to_string(),
            params: parsed.params.iter().map(|p| p.to_string()).collect(),
        })
    }
}
