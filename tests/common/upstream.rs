//! A scripted upstream IRC server.

use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

/// Listens on an ephemeral port; accepts one bouncer connection at a time.
pub struct FakeUpstream {
    listener: TcpListener,
}

/// The bouncer's side of an accepted upstream connection.
pub struct UpstreamPeer {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl FakeUpstream {
    pub async fn bind() -> anyhow::Result<Self> {
        Ok(Self {
            listener: TcpListener::bind("127.0.0.1:0").await?,
        })
    }

    pub fn port(&self) -> u16 {
        self.listener.local_addr().map(|a| a.port()).unwrap_or(0)
    }

    pub async fn accept(&self) -> anyhow::Result<UpstreamPeer> {
        let (stream, _) = timeout(Duration::from_secs(5), self.listener.accept()).await??;
        Ok(UpstreamPeer::new(stream))
    }
}

impl UpstreamPeer {
    fn new(stream: TcpStream) -> Self {
        let (read_half, writer) = stream.into_split();
        Self {
            reader: BufReader::new(read_half),
            writer,
        }
    }

    /// Next line from the bouncer, without the terminator.
    pub async fn recv_line(&mut self) -> anyhow::Result<String> {
        let mut line = String::new();
        let read = timeout(Duration::from_secs(5), self.reader.read_line(&mut line)).await??;
        if read == 0 {
            anyhow::bail!("bouncer closed the upstream connection");
        }
        Ok(line.trim_end().to_string())
    }

    pub async fn send_raw(&mut self, line: &str) -> anyhow::Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\r\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Read the NICK/USER registration and welcome `nick`.
    pub async fn welcome(&mut self) -> anyhow::Result<Vec<String>> {
        let mut lines = Vec::new();
        while !lines.iter().any(|l: &String| l.starts_with("USER ")) {
            lines.push(self.recv_line().await?);
        }
        let nick = lines
            .iter()
            .find_map(|l| l.strip_prefix("NICK "))
            .unwrap_or("*")
            .to_string();
        self.send_raw(&format!(":irc.fake 001 {} :Welcome", nick))
            .await?;
        Ok(lines)
    }
}
