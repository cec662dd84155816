//! Keeps a network's buffers in step with upstream traffic.

use crate::db::NetworkStore;
use crate::metrics;
use crate::state::{Buffer, Network, User};
use bnc_proto::{Message, irc_eq};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// Most private-query buffers kept per network. Messages from further new
/// senders don't create buffers until the client deletes some.
pub(crate) const MAX_QUERY_BUFFERS: usize = 512;

fn is_channel(target: &str) -> bool {
    target.starts_with(['#', '&', '+', '!'])
}

/// Applies buffer changes observed on one upstream session to the owning
/// network, persisting the network whenever a buffer is created or a stored
/// field changes.
pub struct BufferTracker {
    user: Weak<User>,
    store: Arc<dyn NetworkStore>,
    network: String,
    link: Arc<super::Link>,
}

impl BufferTracker {
    pub fn new(user: &Arc<User>, store: Arc<dyn NetworkStore>, network: &Network) -> Self {
        Self {
            user: Arc::downgrade(user),
            store,
            network: network.name.clone(),
            link: Arc::clone(network.link()),
        }
    }

    /// Run `f` on the tracked network under its owner's lock, unless the
    /// network was deleted (or deleted and re-added) since this session
    /// started.
    fn with_network(&self, f: impl FnOnce(&str, &mut Network)) {
        let Some(user) = self.user.upgrade() else {
            return;
        };
        let mut networks = user.networks();
        let Some(network) = networks.get_mut(&self.network) else {
            return;
        };
        if Arc::ptr_eq(network.link(), &self.link) {
            f(&user.name, network);
        }
    }

    fn persist(&self, owner: &str, network: &Network, buffer: &str) {
        if let Err(e) = self.store.save_network(owner, network) {
            warn!(network = %network.name, buffer = %buffer, error = %e, "Failed to persist buffer");
        }
    }

    /// Update a channel buffer with `apply`, creating it first if needed.
    /// `apply` returns whether it changed anything that is persisted.
    fn update(&self, name: &str, apply: impl FnOnce(&mut Buffer) -> bool) {
        self.with_network(|owner, network| {
            let dirty = {
                let (buffer, created) = network.buffers.touch(name, true);
                if created {
                    debug!(network = %network.name, buffer = %name, "Buffer created");
                    metrics::buffer_created();
                }
                apply(buffer) || created
            };
            if dirty {
                self.persist(owner, network, name);
            }
        });
    }

    /// Make sure a query buffer exists for `sender`, within the per-network cap.
    fn touch_query(&self, sender: &str) {
        self.with_network(|owner, network| {
            if network.buffers.get(sender).is_some() {
                return;
            }
            let queries = network.buffers.iter().filter(|b| !b.channel).count();
            if queries >= MAX_QUERY_BUFFERS {
                debug!(network = %network.name, buffer = %sender, "Query buffer limit reached");
                metrics::query_buffer_dropped();
                return;
            }
            network.buffers.touch(sender, false);
            debug!(network = %network.name, buffer = %sender, "Buffer created");
            metrics::buffer_created();
            self.persist(owner, network, sender);
        });
    }

    /// Inspect one upstream message addressed to (or sent by) `own_nick`.
    pub fn observe(&self, message: &Message, own_nick: &str) {
        let from_self = message
            .source_nickname()
            .is_some_and(|source| irc_eq(source, own_nick));

        match message.command.as_str() {
            "JOIN" if from_self => {
                if let Some(channel) = message.arg(0) {
                    self.update(channel, |b| {
                        b.joined = true;
                        false
                    });
                }
            }
            "PART" if from_self => {
                if let Some(channel) = message.arg(0) {
                    self.update(channel, |b| {
                        b.joined = false;
                        false
                    });
                }
            }
            "KICK" if message.arg(1).is_some_and(|victim| irc_eq(victim, own_nick)) => {
                if let Some(channel) = message.arg(0) {
                    self.update(channel, |b| {
                        b.joined = false;
                        false
                    });
                }
            }
            "PRIVMSG" | "NOTICE" => {
                let Some(target) = message.arg(0) else {
                    return;
                };
                if is_channel(target) {
                    self.update(target, |_| false);
                } else if irc_eq(target, own_nick)
                    && !from_self
                    && message.prefix.as_deref().is_some_and(|p| p.contains('!'))
                    && let Some(sender) = message.source_nickname()
                {
                    self.touch_query(sender);
                }
            }
            // RPL_TOPIC: <me> <channel> :<topic>
            "332" => {
                if let (Some(channel), Some(topic)) = (message.arg(1), message.arg(2)) {
                    self.update(channel, |b| set_topic(b, topic));
                }
            }
            "TOPIC" => {
                if let Some(channel) = message.arg(0) {
                    let topic = message.arg(1).unwrap_or_default();
                    self.update(channel, |b| set_topic(b, topic));
                }
            }
            _ => {}
        }
    }

    /// Mark every channel as parted, after the session ends.
    pub fn reset_joined(&self) {
        self.with_network(|_, network| {
            for buffer in network.buffers.iter_mut() {
                buffer.joined = false;
            }
        });
    }
}

fn set_topic(buffer: &mut Buffer, topic: &str) -> bool {
    if buffer.topic == topic {
        return false;
    }
    buffer.topic = topic.to_string();
    true
}
