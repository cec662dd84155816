//! # bnc-proto
//!
//! Wire-level building blocks for the ircbnc bouncer.
//!
//! - [`LineCodec`]: newline-framed text for tokio `Framed` transports
//! - [`Message`]: owned IRC message with a nom-based parser
//! - [`TagBlock`]: the `key=value;` parameter block carried by `BOUNCER`
//!   control commands and their multi-field replies
//!
//! ## Quick Start
//!
//! ```rust
//! use bnc_proto::{Message, TagBlock};
//!
//! let msg: Message = "BOUNCER addnetwork network=libera;host=irc.libera.chat"
//!     .parse()
//!     .expect("valid IRC message");
//! assert_eq!(msg.command, "BOUNCER");
//!
//! let tags = TagBlock::parse(msg.arg(1).unwrap_or_default()).unwrap();
//! assert_eq!(tags.get("host"), Some("irc.libera.chat"));
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod casemap;
pub mod error;
pub mod line;
pub mod message;
pub mod tagblock;

pub use self::casemap::{irc_eq, irc_to_lower};
pub use self::error::{MessageParseError, ProtocolError, TagBlockError};
pub use self::line::LineCodec;
pub use self::message::Message;
pub use self::tagblock::{TagBlock, TagBlockWriter};
