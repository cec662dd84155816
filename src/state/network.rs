//! Network sessions and the per-user network directory.

use super::buffer::BufferDirectory;
use crate::upstream::Link;
use bnc_proto::irc_to_lower;
use std::collections::BTreeMap;
use std::sync::Arc;

/// One upstream server address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAddress {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
    pub verify_tls: bool,
}

/// Field changes decoded from a `changenetwork` request.
///
/// `None` means the field was not supplied and must stay untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkChanges {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub password: Option<String>,
    pub nickname: Option<String>,
    pub username: Option<String>,
    pub realname: Option<String>,
    pub use_tls: Option<bool>,
}

/// A configured upstream IRC network owned by one user.
#[derive(Debug)]
pub struct Network {
    /// Display name (case preserved).
    pub name: String,
    /// Server addresses; index 0 is the primary and always exists.
    addresses: Vec<ServerAddress>,
    pub password: String,
    pub nickname: String,
    pub username: String,
    pub realname: String,
    pub buffers: BufferDirectory,
    link: Arc<Link>,
}

impl Network {
    pub fn new(
        name: impl Into<String>,
        primary: ServerAddress,
        nickname: impl Into<String>,
        username: impl Into<String>,
        realname: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            addresses: vec![primary],
            password: String::new(),
            nickname: nickname.into(),
            username: username.into(),
            realname: realname.into(),
            buffers: BufferDirectory::new(),
            link: Arc::new(Link::new()),
        }
    }

    /// Rebuild a network from its addresses. `None` when the list is empty.
    pub fn with_addresses(
        name: impl Into<String>,
        addresses: Vec<ServerAddress>,
        nickname: impl Into<String>,
        username: impl Into<String>,
        realname: impl Into<String>,
    ) -> Option<Self> {
        let mut addresses = addresses.into_iter();
        let primary = addresses.next()?;
        let mut network = Self::new(name, primary, nickname, username, realname);
        network.addresses.extend(addresses);
        Some(network)
    }

    pub fn primary(&self) -> &ServerAddress {
        &self.addresses[0]
    }

    fn primary_mut(&mut self) -> &mut ServerAddress {
        &mut self.addresses[0]
    }

    pub fn addresses(&self) -> &[ServerAddress] {
        &self.addresses
    }

    pub fn link(&self) -> &Arc<Link> {
        &self.link
    }

    /// Apply the supplied fields; everything else is left as is.
    pub fn apply(&mut self, changes: &NetworkChanges) {
        if let Some(host) = &changes.host {
            self.primary_mut().host = host.clone();
        }
        if let Some(port) = changes.port {
            self.primary_mut().port = port;
        }
        if let Some(use_tls) = changes.use_tls {
            self.primary_mut().use_tls = use_tls;
        }
        if let Some(password) = &changes.password {
            self.password = password.clone();
        }
        if let Some(nickname) = &changes.nickname {
            self.nickname = nickname.clone();
        }
        if let Some(username) = &changes.username {
            self.username = username.clone();
        }
        if let Some(realname) = &changes.realname {
            self.realname = realname.clone();
        }
    }
}

/// A user's networks, unique by name ignoring case.
#[derive(Debug, Default)]
pub struct NetworkDirectory {
    networks: BTreeMap<String, Network>,
}

impl NetworkDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Network> {
        self.networks.get(&irc_to_lower(name))
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Network> {
        self.networks.get_mut(&irc_to_lower(name))
    }

    /// Insert a network. Returns `false`, leaving the directory unchanged,
    /// when the name is already taken.
    pub fn insert(&mut self, network: Network) -> bool {
        let key = irc_to_lower(&network.name);
        if self.networks.contains_key(&key) {
            return false;
        }
        self.networks.insert(key, network);
        true
    }

    pub fn remove(&mut self, name: &str) -> Option<Network> {
        self.networks.remove(&irc_to_lower(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Network> {
        self.networks.values()
    }

    pub fn len(&self) -> usize {
        self.networks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn address(host: &str, port: u16) -> ServerAddress {
        ServerAddress {
            host: host.to_string(),
            port,
            use_tls: false,
            verify_tls: false,
        }
    }

    fn network(name: &str) -> Network {
        Network::new(name, address("irc.example.net", 6667), "nick", "user", "Real Name")
    }

    #[test]
    fn test_insert_rejects_case_insensitive_duplicates() {
        let mut dir = NetworkDirectory::new();
        assert!(dir.insert(network("Libera")));
        assert!(!dir.insert(network("LIBERA")));
        assert_eq!(dir.len(), 1);
        assert_eq!(dir.get("libera").map(|n| n.name.as_str()), Some("Libera"));
    }

    #[test]
    fn test_apply_only_touches_supplied_fields() {
        let mut net = network("libera");
        net.password = "secret".to_string();

        net.apply(&NetworkChanges {
            port: Some(6697),
            use_tls: Some(true),
            ..Default::default()
        });

        assert_eq!(net.primary().host, "irc.example.net");
        assert_eq!(net.primary().port, 6697);
        assert!(net.primary().use_tls);
        assert_eq!(net.password, "secret");
        assert_eq!(net.nickname, "nick");
        assert_eq!(net.username, "user");
    }

    #[test]
    fn test_apply_can_clear_password() {
        let mut net = network("libera");
        net.password = "secret".to_string();
        net.apply(&NetworkChanges {
            password: Some(String::new()),
            ..Default::default()
        });
        assert!(net.password.is_empty());
    }

    #[test]
    fn test_with_addresses_requires_primary() {
        assert!(Network::with_addresses("x", Vec::new(), "n", "u", "r").is_none());

        let net = Network::with_addresses(
            "x",
            vec![address("a.example", 1), address("b.example", 2)],
            "n",
            "u",
            "r",
        )
        .unwrap();
        assert_eq!(net.primary().host, "a.example");
        assert_eq!(net.addresses().len(), 2);
    }

    #[test]
    fn test_iteration_is_name_ordered() {
        let mut dir = NetworkDirectory::new();
        dir.insert(network("oftc"));
        dir.insert(network("Libera"));
        let names: Vec<_> = dir.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["Libera", "oftc"]);
    }
}
