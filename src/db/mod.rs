//! Persistence gateway for network sessions.
//!
//! Networks are stored per owning user as a single JSON record that also
//! carries the network's buffers. The live [`Network`] is never serialized
//! directly; it is snapshotted into [`StoredNetwork`] first.

mod networks;

pub use networks::RedbNetworkStore;

use crate::state::{Buffer, Network, ServerAddress, format_seen, parse_seen};
use bnc_proto::irc_to_lower;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::warn;

/// Errors from network persistence.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Durable storage for a user's networks.
///
/// Calls are synchronous so they can run while the owner's directory lock
/// is held.
pub trait NetworkStore: Send + Sync {
    /// Insert or replace a network record.
    fn save_network(&self, owner: &str, network: &Network) -> Result<(), StoreError>;

    /// Delete a network record. Returns whether one existed.
    fn delete_network(&self, owner: &str, name: &str) -> Result<bool, StoreError>;

    /// Load every network owned by `owner`.
    fn load_networks(&self, owner: &str) -> Result<Vec<Network>, StoreError>;
}

/// Serialized network for persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredNetwork {
    /// Network name (case-preserved).
    pub name: String,

    /// Addresses, primary first.
    pub addresses: Vec<StoredAddress>,

    pub password: String,
    pub nickname: String,
    pub username: String,
    pub realname: String,

    #[serde(default)]
    pub buffers: Vec<StoredBuffer>,
}

/// Serialized server address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredAddress {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
    pub verify_tls: bool,
}

/// Serialized buffer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredBuffer {
    pub name: String,
    pub channel: bool,

    /// RFC 3339, UTC.
    pub last_seen: String,

    #[serde(default)]
    pub topic: String,
}

impl StoredNetwork {
    pub fn from_network(network: &Network) -> Self {
        Self {
            name: network.name.clone(),
            addresses: network
                .addresses()
                .iter()
                .map(|a| StoredAddress {
                    host: a.host.clone(),
                    port: a.port,
                    use_tls: a.use_tls,
                    verify_tls: a.verify_tls,
                })
                .collect(),
            password: network.password.clone(),
            nickname: network.nickname.clone(),
            username: network.username.clone(),
            realname: network.realname.clone(),
            buffers: network
                .buffers
                .iter()
                .map(|b| StoredBuffer {
                    name: b.name.clone(),
                    channel: b.channel,
                    last_seen: format_seen(&b.last_seen()),
                    topic: b.topic.clone(),
                })
                .collect(),
        }
    }

    /// Rebuild the live network. `None` when the record has no address.
    pub fn into_network(self) -> Option<Network> {
        let addresses = self
            .addresses
            .into_iter()
            .map(|a| ServerAddress {
                host: a.host,
                port: a.port,
                use_tls: a.use_tls,
                verify_tls: a.verify_tls,
            })
            .collect();

        let mut network = Network::with_addresses(
            self.name,
            addresses,
            self.nickname,
            self.username,
            self.realname,
        )?;
        network.password = self.password;

        for stored in self.buffers {
            let mut buffer = Buffer::new(stored.name, stored.channel);
            match parse_seen(&stored.last_seen) {
                Ok(ts) => buffer.set_last_seen(ts),
                Err(e) => {
                    warn!(network = %network.name, buffer = %buffer.name, error = %e, "Bad stored last_seen, using epoch");
                }
            }
            buffer.topic = stored.topic;
            network.buffers.insert(buffer);
        }

        Some(network)
    }
}

/// Key for a network record: `"owner_lower\0network_lower"`.
pub(crate) fn network_key(owner: &str, name: &str) -> String {
    format!("{}\0{}", irc_to_lower(owner), irc_to_lower(name))
}

/// Non-persistent store, for `:memory:` databases and tests.
#[derive(Debug, Default)]
pub struct MemoryNetworkStore {
    records: Mutex<HashMap<String, StoredNetwork>>,
}

impl MemoryNetworkStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NetworkStore for MemoryNetworkStore {
    fn save_network(&self, owner: &str, network: &Network) -> Result<(), StoreError> {
        self.records.lock().insert(
            network_key(owner, &network.name),
            StoredNetwork::from_network(network),
        );
        Ok(())
    }

    fn delete_network(&self, owner: &str, name: &str) -> Result<bool, StoreError> {
        Ok(self.records.lock().remove(&network_key(owner, name)).is_some())
    }

    fn load_networks(&self, owner: &str) -> Result<Vec<Network>, StoreError> {
        let prefix = format!("{}\0", irc_to_lower(owner));
        let records = self.records.lock();
        let mut stored: Vec<_> = records
            .iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .map(|(_, record)| record.clone())
            .collect();
        stored.sort_by_key(|record| irc_to_lower(&record.name));
        Ok(stored
            .into_iter()
            .filter_map(StoredNetwork::into_network)
            .collect())
    }
}
