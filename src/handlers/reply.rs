//! `BOUNCER` reply construction.
//!
//! Every reply is a prefix-less `BOUNCER <verb> <context...> <payload>`
//! line. Enumerations are a run of item lines closed by an `end` line.

use bnc_proto::Message;

pub const COMMAND: &str = "BOUNCER";

/// Reply status tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    InvalidArgs,
    NetNotFound,
    NameInUse,
    NeedsName,
    BufferNotFound,
    Unknown,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "RPL_OK",
            Self::InvalidArgs => "ERR_INVALIDARGS",
            Self::NetNotFound => "ERR_NETNOTFOUND",
            Self::NameInUse => "ERR_NAMEINUSE",
            Self::NeedsName => "ERR_NEEDSNAME",
            Self::BufferNotFound => "ERR_BUFFERNOTFOUND",
            Self::Unknown => "ERR_UNKNOWN",
        }
    }
}

fn bouncer<'a>(verb: &'a str, context: &[&'a str], tail: &[&'a str]) -> Message {
    let params = std::iter::once(verb)
        .chain(context.iter().copied())
        .chain(tail.iter().copied());
    Message::new(COMMAND, params)
}

/// `BOUNCER <verb> <context...> <status>`
pub fn status(verb: &str, context: &[&str], status: Status) -> Message {
    bouncer(verb, context, &[status.as_str()])
}

/// `BOUNCER <verb> <context...> ERR_UNKNOWN :<text>`
pub fn failure(verb: &str, context: &[&str], text: &str) -> Message {
    bouncer(verb, context, &[Status::Unknown.as_str(), text])
}

/// One enumeration item carrying an encoded tag block.
pub fn item(verb: &str, context: &[&str], tags: &str) -> Message {
    bouncer(verb, context, &[tags])
}

/// Enumeration terminator.
pub fn end(verb: &str, context: &[&str]) -> Message {
    bouncer(verb, context, &["end"])
}

/// `BOUNCER state <network> <state>`
pub fn state(network: &str, state: &str) -> Message {
    bouncer("state", &[network], &[state])
}
