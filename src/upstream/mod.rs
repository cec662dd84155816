//! Upstream network links.
//!
//! Each [`Network`](crate::state::Network) owns a [`Link`]: its connection
//! state plus the cancellation handle of the task driving the connection.
//! Starting a link never blocks; the task reports the outcome later on the
//! requesting client's channel as a `BOUNCER state` notification.

mod connector;
mod session;
mod tls;
mod tracker;

pub use connector::{Connector, UpstreamStream};
pub use session::SessionPlan;
pub use tracker::BufferTracker;

use crate::metrics;
use bnc_proto::{Message, ProtocolError};
use parking_lot::RwLock;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Errors from an upstream connection attempt or session.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("{0} timed out")]
    Timeout(&'static str),

    #[error("invalid TLS server name: {0}")]
    InvalidServerName(String),

    #[error("server closed the connection")]
    Closed,

    #[error("server sent ERROR: {0}")]
    Rejected(String),

    #[error("network has no usable address")]
    NoAddress,
}

/// Connection state of a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected { nick: String },
}

impl LinkState {
    /// Token used in `BOUNCER state` notifications.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected { .. } => "connected",
        }
    }
}

/// Result of [`Link::start`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// A connection task was spawned.
    Started,
    /// The link was already connecting or connected.
    AlreadyActive(LinkState),
}

#[derive(Debug)]
struct LinkInner {
    state: LinkState,
    /// Bumped on every start and stop so a stale task can't overwrite state.
    generation: u64,
    cancel: Option<CancellationToken>,
}

/// Connection handle of one network.
#[derive(Debug)]
pub struct Link {
    inner: RwLock<LinkInner>,
}

impl Default for Link {
    fn default() -> Self {
        Self::new()
    }
}

impl Link {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(LinkInner {
                state: LinkState::Disconnected,
                generation: 0,
                cancel: None,
            }),
        }
    }

    pub fn state(&self) -> LinkState {
        self.inner.read().state.clone()
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.inner.read().state, LinkState::Connected { .. })
    }

    /// Live nickname, only while connected.
    pub fn current_nick(&self) -> Option<String> {
        match &self.inner.read().state {
            LinkState::Connected { nick } => Some(nick.clone()),
            _ => None,
        }
    }

    /// Begin connecting unless the link is already active.
    ///
    /// The spawned task sends `connected` or `disconnected` to `notify` when
    /// the attempt resolves. Must be called from within a tokio runtime.
    pub fn start(
        self: &Arc<Self>,
        connector: Arc<Connector>,
        plan: SessionPlan,
        tracker: BufferTracker,
        notify: mpsc::Sender<Message>,
    ) -> StartOutcome {
        let (generation, cancel) = {
            let mut inner = self.inner.write();
            if inner.state != LinkState::Disconnected {
                return StartOutcome::AlreadyActive(inner.state.clone());
            }
            inner.generation += 1;
            let cancel = CancellationToken::new();
            inner.cancel = Some(cancel.clone());
            set_state(&mut inner, LinkState::Connecting);
            (inner.generation, cancel)
        };

        tokio::spawn(session::run(
            Arc::clone(self),
            generation,
            cancel,
            connector,
            plan,
            tracker,
            notify,
        ));
        StartOutcome::Started
    }

    /// Tear the link down. Returns whether it was connecting or connected.
    pub fn stop(&self) -> bool {
        let mut inner = self.inner.write();
        if let Some(cancel) = inner.cancel.take() {
            cancel.cancel();
        }
        inner.generation += 1;
        let was_active = inner.state != LinkState::Disconnected;
        set_state(&mut inner, LinkState::Disconnected);
        was_active
    }

    /// Move to `state` if `generation` is still current.
    pub(crate) fn transition(&self, generation: u64, state: LinkState) -> bool {
        let mut inner = self.inner.write();
        if inner.generation != generation {
            return false;
        }
        if state == LinkState::Disconnected {
            inner.cancel = None;
        }
        set_state(&mut inner, state);
        true
    }

    /// Record a nick change seen on a connected session.
    pub(crate) fn set_nick(&self, generation: u64, nick: &str) {
        let mut inner = self.inner.write();
        if inner.generation != generation {
            return;
        }
        if let LinkState::Connected { nick: current } = &mut inner.state {
            *current = nick.to_string();
        }
    }
}

fn set_state(inner: &mut LinkInner, state: LinkState) {
    let was_connected = matches!(inner.state, LinkState::Connected { .. });
    let is_connected = matches!(state, LinkState::Connected { .. });
    match (was_connected, is_connected) {
        (false, true) => metrics::upstream_up(),
        (true, false) => metrics::upstream_down(),
        _ => {}
    }
    inner.state = state;
}

#[cfg(test)]
impl Link {
    /// Current generation, for driving `transition` in tests.
    pub(crate) fn generation(&self) -> u64 {
        self.inner.read().generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_link_is_disconnected() {
        let link = Link::new();
        assert_eq!(link.state(), LinkState::Disconnected);
        assert!(!link.is_connected());
        assert!(link.current_nick().is_none());
        assert!(!link.stop());
    }

    #[test]
    fn test_stale_generation_is_ignored() {
        let link = Link::new();
        let generation = link.generation();
        link.stop();

        assert!(!link.transition(
            generation,
            LinkState::Connected {
                nick: "alice".into()
            }
        ));
        assert_eq!(link.state(), LinkState::Disconnected);
    }

    #[test]
    fn test_nick_tracking_while_connected() {
        let link = Link::new();
        let generation = link.generation();
        assert!(link.transition(
            generation,
            LinkState::Connected {
                nick: "alice".into()
            }
        ));
        link.set_nick(generation, "alice_");

        assert!(link.is_connected());
        assert_eq!(link.current_nick().as_deref(), Some("alice_"));
        assert!(link.stop());
        assert!(link.current_nick().is_none());
    }

    #[test]
    fn test_state_tokens() {
        assert_eq!(LinkState::Disconnected.as_str(), "disconnected");
        assert_eq!(LinkState::Connecting.as_str(), "connecting");
        assert_eq!(
            LinkState::Connected { nick: "x".into() }.as_str(),
            "connected"
        );
    }
}
