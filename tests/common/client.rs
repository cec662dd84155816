//! Test IRC client.
//!
//! Connects to a running bouncer, registers as a bouncer user and asserts on
//! the lines it receives.

use bnc_proto::Message;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::timeout;

/// A test IRC client.
pub struct TestClient {
    reader: BufReader<OwnedReadHalf>,
    writer: BufWriter<OwnedWriteHalf>,
    nick: String,
}

impl TestClient {
    /// Connect to a test server.
    pub async fn connect(address: &str, nick: &str) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(address).await?;
        let (read_half, write_half) = stream.into_split();

        Ok(Self {
            reader: BufReader::new(read_half),
            writer: BufWriter::new(write_half),
            nick: nick.to_string(),
        })
    }

    /// Send a raw IRC line.
    pub async fn send_raw(&mut self, line: &str) -> anyhow::Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        if !line.ends_with("\r\n") {
            self.writer.write_all(b"\r\n").await?;
        }
        self.writer.flush().await?;
        Ok(())
    }

    /// Receive a single message from the server.
    pub async fn recv(&mut self) -> anyhow::Result<Message> {
        self.recv_timeout(Duration::from_secs(5)).await
    }

    /// Receive a message with a timeout.
    pub async fn recv_timeout(&mut self, dur: Duration) -> anyhow::Result<Message> {
        let mut line = String::new();
        let read = timeout(dur, self.reader.read_line(&mut line)).await??;
        if read == 0 {
            anyhow::bail!("connection closed");
        }
        line.parse::<Message>()
            .map_err(|e| anyhow::anyhow!("Parse error: {}", e))
    }

    /// Receive one line, serialized back to text.
    pub async fn recv_line(&mut self) -> anyhow::Result<String> {
        Ok(self.recv().await?.to_string())
    }

    /// Receive lines until (and including) the one matching `predicate`.
    pub async fn recv_until<F>(&mut self, mut predicate: F) -> anyhow::Result<Vec<String>>
    where
        F: FnMut(&str) -> bool,
    {
        let mut lines = Vec::new();
        loop {
            let line = self.recv_line().await?;
            let done = predicate(&line);
            lines.push(line);
            if done {
                break;
            }
        }
        Ok(lines)
    }

    /// Register as bouncer user `user` (NICK + USER) and wait for 001.
    pub async fn register(&mut self, user: &str) -> anyhow::Result<()> {
        let nick = self.nick.clone();
        self.send_raw(&format!("NICK {}", nick)).await?;
        self.send_raw(&format!("USER {} 0 * :Test User {}", user, nick))
            .await?;

        let welcome = self.recv().await?;
        if welcome.command == "001" {
            Ok(())
        } else {
            anyhow::bail!("Registration failed: got {}", welcome)
        }
    }

    /// Send a `BOUNCER` command and collect replies through the `end` line.
    pub async fn list(&mut self, command: &str) -> anyhow::Result<Vec<String>> {
        self.send_raw(command).await?;
        self.recv_until(|line| line.ends_with(" end")).await
    }

    /// Send QUIT.
    pub async fn quit(&mut self) -> anyhow::Result<()> {
        self.send_raw("QUIT").await
    }
}
