//! State management module.
//!
//! Contains the Bouncer (shared server state) and the user, network and
//! buffer entities it owns.

mod buffer;
mod network;
mod user;

pub use buffer::{Buffer, format_seen, parse_seen};
pub use network::{Network, NetworkChanges, ServerAddress};
pub use user::{Identity, User};

use crate::db::{NetworkStore, StoreError};
use crate::upstream::Connector;
use bnc_proto::irc_to_lower;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Shared server state.
pub struct Bouncer {
    /// Name used as the source of numerics sent to clients.
    pub server_name: String,
    /// Users, indexed by case-folded name.
    users: DashMap<String, Arc<User>>,
    /// Persistence gateway.
    pub store: Arc<dyn NetworkStore>,
    /// Opens upstream connections.
    pub connector: Arc<Connector>,
}

impl Bouncer {
    pub fn new(
        server_name: impl Into<String>,
        store: Arc<dyn NetworkStore>,
        connector: Arc<Connector>,
    ) -> Self {
        Self {
            server_name: server_name.into(),
            users: DashMap::new(),
            store,
            connector,
        }
    }

    /// Register a user. Returns the existing user when the name is taken.
    pub fn add_user(&self, user: User) -> Arc<User> {
        self.users
            .entry(irc_to_lower(&user.name))
            .or_insert_with(|| Arc::new(user))
            .clone()
    }

    pub fn user(&self, name: &str) -> Option<Arc<User>> {
        self.users.get(&irc_to_lower(name)).map(|u| u.clone())
    }

    /// Load every user's persisted networks into its directory.
    pub fn load_networks(&self) -> Result<usize, StoreError> {
        let mut total = 0;
        for entry in self.users.iter() {
            let user = entry.value();
            let networks = self.store.load_networks(&user.name)?;
            let mut dir = user.networks();
            for network in networks {
                let name = network.name.clone();
                if dir.insert(network) {
                    total += 1;
                } else {
                    warn!(user = %user.name, network = %name, "Duplicate stored network skipped");
                }
            }
            info!(user = %user.name, networks = dir.len(), "Loaded networks");
        }
        Ok(total)
    }

    /// Stop every upstream link.
    pub fn shutdown(&self) {
        for entry in self.users.iter() {
            let dir = entry.value().networks();
            for network in dir.iter() {
                network.link().stop();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryNetworkStore;
    use crate::upstream::Connector;

    fn identity() -> Identity {
        Identity {
            nick: "alice".into(),
            username: "alice".into(),
            realname: "Alice".into(),
        }
    }

    #[test]
    fn test_users_are_case_insensitive() {
        let bouncer = Bouncer::new(
            "bnc.test",
            Arc::new(MemoryNetworkStore::new()),
            Arc::new(Connector::default()),
        );
        bouncer.add_user(User::new("Alice", identity()));
        let again = bouncer.add_user(User::new("ALICE", identity()));

        assert_eq!(again.name, "Alice");
        assert!(bouncer.user("alice").is_some());
        assert!(bouncer.user("bob").is_none());
    }

    #[test]
    fn test_load_networks_fills_directories() {
        let store = Arc::new(MemoryNetworkStore::new());
        let network = Network::new(
            "libera",
            ServerAddress {
                host: "irc.libera.chat".into(),
                port: 6697,
                use_tls: true,
                verify_tls: false,
            },
            "alice",
            "alice",
            "Alice",
        );
        store.save_network("alice", &network).unwrap();

        let bouncer = Bouncer::new("bnc.test", store, Arc::new(Connector::default()));
        let user = bouncer.add_user(User::new("alice", identity()));

        assert_eq!(bouncer.load_networks().unwrap(), 1);
        let dir = user.networks();
        let loaded = dir.get("LIBERA").unwrap();
        assert_eq!(loaded.primary().port, 6697);
        assert!(!loaded.link().is_connected());
    }
}
