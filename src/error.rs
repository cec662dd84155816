//! Error handling for command processing.
//!
//! A rejected command carries the context parameters its reply echoes, so
//! the router can emit exactly one status line for it.

use crate::db::StoreError;
use crate::handlers::reply::{self, Status};
use bnc_proto::Message;
use thiserror::Error;
use tokio::sync::mpsc;

/// Build the context parameters of a rejection reply.
pub fn context<const N: usize>(parts: [&str; N]) -> Vec<String> {
    parts.iter().map(|p| p.to_string()).collect()
}

/// Errors that can occur during command handling.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("invalid arguments")]
    InvalidArgs(Vec<String>),

    #[error("network not found")]
    NetworkNotFound(Vec<String>),

    #[error("network name already in use")]
    NameInUse(Vec<String>),

    #[error("network name required")]
    NeedsName,

    #[error("buffer not found")]
    BufferNotFound(Vec<String>),

    #[error("error saving the {what}: {source}")]
    SaveFailed {
        context: Vec<String>,
        what: &'static str,
        source: StoreError,
    },

    #[error("client channel closed")]
    Send,
}

impl<T> From<mpsc::error::SendError<T>> for HandlerError {
    fn from(_: mpsc::error::SendError<T>) -> Self {
        Self::Send
    }
}

impl HandlerError {
    /// Status token for the reply, `None` when no reply can be sent.
    pub fn status(&self) -> Option<Status> {
        match self {
            Self::InvalidArgs(_) => Some(Status::InvalidArgs),
            Self::NetworkNotFound(_) => Some(Status::NetNotFound),
            Self::NameInUse(_) => Some(Status::NameInUse),
            Self::NeedsName => Some(Status::NeedsName),
            Self::BufferNotFound(_) => Some(Status::BufferNotFound),
            Self::SaveFailed { .. } => Some(Status::Unknown),
            Self::Send => None,
        }
    }

    /// Static label for metrics.
    pub fn error_code(&self) -> &'static str {
        self.status().map_or("send_error", |s| s.as_str())
    }

    /// The reply line for this error.
    pub fn to_reply(&self, verb: &str) -> Option<Message> {
        let parts: Vec<&str> = match self {
            Self::InvalidArgs(parts)
            | Self::NetworkNotFound(parts)
            | Self::NameInUse(parts)
            | Self::BufferNotFound(parts)
            | Self::SaveFailed { context: parts, .. } => parts.iter().map(String::as_str).collect(),
            Self::NeedsName => vec!["*"],
            Self::Send => return None,
        };

        Some(match self {
            Self::SaveFailed { what, .. } => {
                reply::failure(verb, &parts, &format!("Error saving the {}", what))
            }
            _ => reply::status(verb, &parts, self.status()?),
        })
    }
}

/// Result type for command handlers.
pub type HandlerResult = Result<(), HandlerError>;
