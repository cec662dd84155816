//! Configuration loading and management.

use serde::Deserialize;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("no [[user]] blocks configured")]
    NoUsers,
    #[error("duplicate user name: {0}")]
    DuplicateUser(String),
    #[error("user block has an empty name")]
    EmptyUserName,
}

/// Bouncer configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server identity.
    pub server: ServerConfig,
    /// Client listener.
    pub listen: ListenConfig,
    /// Network persistence.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Upstream connection tuning.
    #[serde(default)]
    pub upstream: UpstreamConfig,
    /// Optional Prometheus endpoint.
    pub metrics: Option<MetricsConfig>,
    /// Bouncer users.
    #[serde(default, rename = "user")]
    pub users: Vec<UserBlock>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.users.is_empty() {
            return Err(ConfigError::NoUsers);
        }

        let mut seen = HashSet::new();
        for user in &self.users {
            if user.name.is_empty() {
                return Err(ConfigError::EmptyUserName);
            }
            if !seen.insert(bnc_proto::irc_to_lower(&user.name)) {
                return Err(ConfigError::DuplicateUser(user.name.clone()));
            }
        }
        Ok(())
    }
}

/// Server identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Name used as the source of numerics sent to clients.
    pub name: String,
}

/// Client listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenConfig {
    /// Address to bind.
    pub address: SocketAddr,
}

/// Persistence configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Redb file path, or `:memory:` for a non-persistent store.
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Upstream connection tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// TCP (and TLS) connect timeout per address.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Time allowed between connecting and receiving `001`.
    #[serde(default = "default_register_timeout")]
    pub register_timeout_secs: u64,
    /// Longest line accepted from an upstream server.
    #[serde(default = "default_max_line_len")]
    pub max_line_len: usize,
}

impl UpstreamConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn register_timeout(&self) -> Duration {
        Duration::from_secs(self.register_timeout_secs)
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            register_timeout_secs: default_register_timeout(),
            max_line_len: default_max_line_len(),
        }
    }
}

/// Prometheus endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Port for `/metrics`.
    pub port: u16,
}

/// A bouncer user and the identity used for networks that don't set one.
#[derive(Debug, Clone, Deserialize)]
pub struct UserBlock {
    /// Login name (matched against the client's USER username).
    pub name: String,
    /// Default nickname; falls back to `name`.
    pub nick: Option<String>,
    /// Default username; falls back to `name`.
    pub username: Option<String>,
    /// Default realname; falls back to `name`.
    pub realname: Option<String>,
}

fn default_db_path() -> String {
    "ircbnc.redb".to_string()
}

fn default_connect_timeout() -> u64 {
    15
}

fn default_register_timeout() -> u64 {
    60
}

fn default_max_line_len() -> usize {
    // IRCv3 tags make upstream lines longer than 512 bytes.
    8191
}
