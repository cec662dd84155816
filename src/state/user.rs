//! Bouncer users.

use super::network::NetworkDirectory;
use crate::config::UserBlock;
use parking_lot::{Mutex, MutexGuard};

/// Identity used for networks that don't set their own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub nick: String,
    pub username: String,
    pub realname: String,
}

impl Identity {
    pub fn from_block(block: &UserBlock) -> Self {
        Self {
            nick: block.nick.clone().unwrap_or_else(|| block.name.clone()),
            username: block.username.clone().unwrap_or_else(|| block.name.clone()),
            realname: block.realname.clone().unwrap_or_else(|| block.name.clone()),
        }
    }
}

/// A bouncer account and the networks it owns.
#[derive(Debug)]
pub struct User {
    pub name: String,
    pub defaults: Identity,
    networks: Mutex<NetworkDirectory>,
}

impl User {
    pub fn new(name: impl Into<String>, defaults: Identity) -> Self {
        Self {
            name: name.into(),
            defaults,
            networks: Mutex::new(NetworkDirectory::new()),
        }
    }

    pub fn from_block(block: &UserBlock) -> Self {
        Self::new(block.name.clone(), Identity::from_block(block))
    }

    /// Lock the network directory.
    ///
    /// Hold the guard across a lookup, the mutation that follows it, and the
    /// matching store call. Never hold it across an `.await`.
    pub fn networks(&self) -> MutexGuard<'_, NetworkDirectory> {
        self.networks.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_falls_back_to_user_name() {
        let block = UserBlock {
            name: "alice".to_string(),
            nick: Some("al".to_string()),
            username: None,
            realname: None,
        };
        let identity = Identity::from_block(&block);
        assert_eq!(identity.nick, "al");
        assert_eq!(identity.username, "alice");
        assert_eq!(identity.realname, "alice");
    }
}
