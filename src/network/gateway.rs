//! Gateway - TCP listener that accepts incoming client connections.
//!
//! The Gateway binds the configured listen address and spawns a Connection
//! task for each client.

use crate::handlers::BouncerHook;
use crate::hooks::HookBus;
use crate::network::Connection;
use crate::state::Bouncer;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, instrument};

/// The Gateway accepts incoming TCP connections and spawns handlers.
pub struct Gateway {
    listener: TcpListener,
    bouncer: Arc<Bouncer>,
    hooks: Arc<HookBus>,
}

impl Gateway {
    /// Bind the gateway to the client listen address.
    pub async fn bind(addr: SocketAddr, bouncer: Arc<Bouncer>) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "Client listener bound");

        let mut hooks = HookBus::new();
        hooks.register(BouncerHook::new());

        Ok(Self {
            listener,
            bouncer,
            hooks: Arc::new(hooks),
        })
    }

    /// The bound address (useful when binding port 0).
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Run the gateway, accepting connections forever.
    #[instrument(skip(self), name = "gateway")]
    pub async fn run(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    debug!(%addr, "Connection accepted");
                    let connection = Connection::new(
                        stream,
                        addr,
                        Arc::clone(&self.bouncer),
                        Arc::clone(&self.hooks),
                    );
                    tokio::spawn(async move {
                        if let Err(e) = connection.run().await {
                            debug!(%addr, error = %e, "Connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }
}
