//! Test server management.
//!
//! Spawns and manages ircbnc instances for integration testing.

use std::path::{Path, PathBuf};
use std::process::{Child, Command};
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::sleep;

/// A test bouncer instance.
pub struct TestServer {
    child: Child,
    port: u16,
}

impl TestServer {
    /// Spawn a bouncer with users `alice` and `bob` and a redb store in
    /// `data_dir`.
    pub async fn spawn(port: u16, data_dir: &TempDir) -> anyhow::Result<Self> {
        let config_path = data_dir.path().join("ircbnc.toml");
        let config_content = format!(
            r#"
[server]
name = "bnc.test"

[listen]
address = "127.0.0.1:{}"

[database]
path = "{}"

[upstream]
connect_timeout_secs = 2
register_timeout_secs = 5

[[user]]
name = "alice"
nick = "alice"
realname = "Alice Liddell"

[[user]]
name = "bob"
"#,
            port,
            data_dir.path().join("networks.redb").display()
        );
        std::fs::write(&config_path, config_content)?;

        Self::spawn_with_config(port, &config_path).await
    }

    /// Spawn a bouncer with an existing config file.
    pub async fn spawn_with_config(port: u16, config_path: &Path) -> anyhow::Result<Self> {
        let binary_path = PathBuf::from(env!("CARGO_BIN_EXE_ircbnc"));
        let child = Command::new(&binary_path).arg(config_path).spawn()?;

        let server = Self { child, port };
        server.wait_until_ready().await?;
        Ok(server)
    }

    /// Wait until the server is accepting connections.
    async fn wait_until_ready(&self) -> anyhow::Result<()> {
        for _ in 0..50 {
            if tokio::net::TcpStream::connect(("127.0.0.1", self.port))
                .await
                .is_ok()
            {
                return Ok(());
            }
            sleep(Duration::from_millis(100)).await;
        }
        anyhow::bail!("Server failed to start within 5 seconds")
    }

    /// Get the server address.
    pub fn address(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }

    /// Connect and register a client as bouncer user `user`.
    pub async fn attach(&self, nick: &str, user: &str) -> anyhow::Result<super::TestClient> {
        let mut client = super::TestClient::connect(&self.address(), nick).await?;
        client.register(user).await?;
        Ok(client)
    }

    /// Kill the process and wait for it to exit.
    pub fn stop(mut self) {
        self.kill();
    }

    fn kill(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.kill();
    }
}
