//! Opens transport connections to upstream servers.

use super::UpstreamError;
use super::tls;
use crate::config::UpstreamConfig;
use crate::state::ServerAddress;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tracing::debug;

/// A plaintext or TLS upstream stream.
pub enum UpstreamStream {
    Plain(TcpStream),
    Tls(TlsStream<TcpStream>),
}

impl UpstreamStream {
    pub fn is_tls(&self) -> bool {
        !matches!(self, Self::Plain(_))
    }
}

impl AsyncRead for UpstreamStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            UpstreamStream::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            UpstreamStream::Tls(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for UpstreamStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            UpstreamStream::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            UpstreamStream::Tls(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            UpstreamStream::Plain(stream) => Pin::new(stream).poll_flush(cx),
            UpstreamStream::Tls(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            UpstreamStream::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            UpstreamStream::Tls(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

/// Connection settings shared by every upstream link.
#[derive(Debug, Clone)]
pub struct Connector {
    connect_timeout: Duration,
    register_timeout: Duration,
    max_line_len: usize,
}

impl Connector {
    pub fn new(config: &UpstreamConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
            register_timeout: config.register_timeout(),
            max_line_len: config.max_line_len,
        }
    }

    pub fn register_timeout(&self) -> Duration {
        self.register_timeout
    }

    pub fn max_line_len(&self) -> usize {
        self.max_line_len
    }

    /// Connect to one address, upgrading to TLS when it asks for it.
    pub async fn open(&self, address: &ServerAddress) -> Result<UpstreamStream, UpstreamError> {
        let tcp = timeout(
            self.connect_timeout,
            TcpStream::connect((address.host.as_str(), address.port)),
        )
        .await
        .map_err(|_| UpstreamError::Timeout("connect"))??;

        if !address.use_tls {
            debug!(host = %address.host, port = address.port, "Upstream TCP connected");
            return Ok(UpstreamStream::Plain(tcp));
        }

        let server_name = ServerName::try_from(address.host.clone())
            .map_err(|_| UpstreamError::InvalidServerName(address.host.clone()))?;
        let connector = TlsConnector::from(tls::client_config(address.verify_tls));
        let stream = timeout(self.connect_timeout, connector.connect(server_name, tcp))
            .await
            .map_err(|_| UpstreamError::Timeout("TLS handshake"))??;

        debug!(host = %address.host, port = address.port, verify = address.verify_tls, "Upstream TLS connected");
        Ok(UpstreamStream::Tls(stream))
    }
}

impl Default for Connector {
    fn default() -> Self {
        Self::new(&UpstreamConfig::default())
    }
}
