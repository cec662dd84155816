//! Redb-backed network persistence.
//!
//! # Schema
//!
//! ```text
//! NETWORKS: "owner_lower\0network_lower" -> StoredNetwork (serde_json)
//! ```

use super::{NetworkStore, StoreError, StoredNetwork, network_key};
use crate::state::Network;
use bnc_proto::irc_to_lower;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Redb table for network records.
const NETWORKS: TableDefinition<&str, &[u8]> = TableDefinition::new("networks");

/// Redb-backed network store.
pub struct RedbNetworkStore {
    db: Arc<Database>,
}

impl RedbNetworkStore {
    /// Open (or create) the database file at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = Database::create(path)?;
        Self::new(Arc::new(db))
    }

    /// Create a store on an existing database.
    pub fn new(db: Arc<Database>) -> Result<Self, StoreError> {
        // Ensure the table exists
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(NETWORKS)?;
        }
        write_txn.commit()?;

        info!("Network store initialized");
        Ok(Self { db })
    }
}

impl NetworkStore for RedbNetworkStore {
    fn save_network(&self, owner: &str, network: &Network) -> Result<(), StoreError> {
        let key = network_key(owner, &network.name);
        let stored = StoredNetwork::from_network(network);
        let value =
            serde_json::to_vec(&stored).map_err(|e| StoreError::Serialization(e.to_string()))?;

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(NETWORKS)?;
            table.insert(key.as_str(), value.as_slice())?;
        }
        write_txn.commit()?;

        debug!(owner = %owner, network = %network.name, "Saved network");
        Ok(())
    }

    fn delete_network(&self, owner: &str, name: &str) -> Result<bool, StoreError> {
        let key = network_key(owner, name);
        let write_txn = self.db.begin_write()?;
        let deleted = {
            let mut table = write_txn.open_table(NETWORKS)?;
            table.remove(key.as_str())?.is_some()
        };
        write_txn.commit()?;

        if deleted {
            debug!(owner = %owner, network = %name, "Deleted network");
        }
        Ok(deleted)
    }

    fn load_networks(&self, owner: &str) -> Result<Vec<Network>, StoreError> {
        let prefix = format!("{}\0", irc_to_lower(owner));
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(NETWORKS)?;

        let mut networks = Vec::new();
        for item in table.iter()? {
            let (key, value) = item?;
            if !key.value().starts_with(&prefix) {
                continue;
            }
            match serde_json::from_slice::<StoredNetwork>(value.value()) {
                Ok(stored) => match stored.into_network() {
                    Some(network) => networks.push(network),
                    None => warn!(key = %key.value(), "Stored network has no address, skipping"),
                },
                Err(e) => {
                    warn!(key = %key.value(), error = %e, "Failed to deserialize network, skipping");
                }
            }
        }
        Ok(networks)
    }
}
