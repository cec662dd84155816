//! Connection - Handles an individual client connection.
//!
//! Each Connection runs in its own Tokio task:
//!
//! ```text
//! Phase 1: Registration (CAP / NICK / USER, selects the bouncer user)
//!    ↓
//! Phase 2: Attached loop
//!    client line ─▶ HookBus (BOUNCER router) ─▶ relay (not attached)
//!                        │
//!                        ▼
//!                 mpsc::Sender<Message> ─▶ writer task ─▶ socket
//! ```
//!
//! Upstream link tasks started by this client hold clones of the sender, so
//! the writer is stopped explicitly when the client goes away.

use crate::handlers::Context;
use crate::hooks::{HookBus, RawEvent};
use crate::metrics;
use crate::state::{Bouncer, User};
use bnc_proto::{LineCodec, Message, ProtocolError};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendError;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Capability advertised to clients.
const CAPABILITY: &str = "bouncer";

/// Outgoing queue depth per client.
const OUTGOING_QUEUE: usize = 256;

type ClientFramed = Framed<TcpStream, LineCodec>;
type ClientSink = SplitSink<ClientFramed, String>;
type ClientStream = SplitStream<ClientFramed>;

/// Errors that end a client connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("client writer closed")]
    WriterClosed,
}

impl<T> From<SendError<T>> for ConnectionError {
    fn from(_: SendError<T>) -> Self {
        Self::WriterClosed
    }
}

/// A client connection handler.
pub struct Connection {
    session: Uuid,
    addr: SocketAddr,
    stream: TcpStream,
    bouncer: Arc<Bouncer>,
    hooks: Arc<HookBus>,
}

impl Connection {
    pub fn new(
        stream: TcpStream,
        addr: SocketAddr,
        bouncer: Arc<Bouncer>,
        hooks: Arc<HookBus>,
    ) -> Self {
        Self {
            session: Uuid::new_v4(),
            addr,
            stream,
            bouncer,
            hooks,
        }
    }

    /// Run the connection until the client quits or the socket closes.
    #[instrument(skip(self), fields(session = %self.session, addr = %self.addr), name = "connection")]
    pub async fn run(self) -> Result<(), ConnectionError> {
        metrics::client_connected();
        info!("Client connected");

        let codec = LineCodec::with_max_len(self.bouncer.connector.max_line_len());
        let (sink, mut lines) = Framed::new(self.stream, codec).split();
        let (tx, rx) = mpsc::channel::<Message>(OUTGOING_QUEUE);
        let closing = CancellationToken::new();
        let writer = tokio::spawn(write_loop(sink, rx, closing.clone()));

        let result = serve(&self.bouncer, &self.hooks, &mut lines, &tx).await;

        closing.cancel();
        drop(tx);
        if let Err(e) = writer.await {
            warn!(error = %e, "Client writer task failed");
        }

        metrics::client_disconnected();
        info!("Client disconnected");
        result
    }
}

async fn serve(
    bouncer: &Arc<Bouncer>,
    hooks: &HookBus,
    lines: &mut ClientStream,
    tx: &mpsc::Sender<Message>,
) -> Result<(), ConnectionError> {
    let Some(user) = register(bouncer, lines, tx).await? else {
        return Ok(());
    };
    info!(user = %user.name, "Client attached");

    let ctx = Context {
        bouncer,
        user: &user,
        sender: tx,
    };

    while let Some(message) = next_message(lines).await? {
        match message.command.to_ascii_uppercase().as_str() {
            "PING" => tx.send(pong(&bouncer.server_name, &message)).await?,
            "QUIT" => break,
            "CAP" => cap(&bouncer.server_name, "*", &message, tx).await?,
            _ => {
                let mut event = RawEvent::from_client(message);
                hooks.dispatch(&ctx, &mut event).await;
                if !event.halt {
                    debug!(command = %event.message.command, "No upstream relay for client frame; dropped");
                }
            }
        }
    }

    Ok(())
}

/// Read until NICK and USER (and CAP END, if negotiation started) arrive.
/// Returns `None` when the client leaves or names an unknown user.
async fn register(
    bouncer: &Bouncer,
    lines: &mut ClientStream,
    tx: &mpsc::Sender<Message>,
) -> Result<Option<Arc<User>>, ConnectionError> {
    let mut nick: Option<String> = None;
    let mut username: Option<String> = None;
    let mut negotiating = false;

    loop {
        let Some(message) = next_message(lines).await? else {
            return Ok(None);
        };

        match message.command.to_ascii_uppercase().as_str() {
            "CAP" => {
                negotiating = !message
                    .arg(0)
                    .is_some_and(|sub| sub.eq_ignore_ascii_case("END"));
                let target = nick.as_deref().unwrap_or("*");
                cap(&bouncer.server_name, target, &message, tx).await?;
            }
            "NICK" => {
                if let Some(n) = message.arg(0).filter(|n| !n.is_empty()) {
                    nick = Some(n.to_string());
                }
            }
            "USER" => {
                if let Some(u) = message.arg(0).filter(|u| !u.is_empty()) {
                    username = Some(u.to_string());
                }
            }
            "PING" => tx.send(pong(&bouncer.server_name, &message)).await?,
            "QUIT" => return Ok(None),
            other => debug!(command = %other, "Ignoring command before registration"),
        }

        if negotiating {
            continue;
        }
        let (Some(nick), Some(username)) = (nick.as_deref(), username.as_deref()) else {
            continue;
        };

        let Some(user) = bouncer.user(username) else {
            warn!(%username, "Unknown bouncer user");
            tx.send(Message::new("ERROR", ["Unknown bouncer user"])).await?;
            return Ok(None);
        };

        let welcome = format!("Welcome to the {} bouncer, {}", bouncer.server_name, nick);
        tx.send(
            Message::new("001", [nick, welcome.as_str()]).with_prefix(bouncer.server_name.as_str()),
        )
        .await?;
        return Ok(Some(user));
    }
}

/// Next parseable message; unparseable lines are skipped.
async fn next_message(lines: &mut ClientStream) -> Result<Option<Message>, ProtocolError> {
    while let Some(line) = lines.next().await {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match line.parse::<Message>() {
            Ok(message) => return Ok(Some(message)),
            Err(e) => debug!(error = %e, "Dropping unparseable client line"),
        }
    }
    Ok(None)
}

fn pong(server: &str, ping: &Message) -> Message {
    let token = ping.arg(0).unwrap_or(server);
    Message::new("PONG", [server, token]).with_prefix(server)
}

/// Answer `CAP LS`/`CAP REQ`. Only `bouncer` is offered; a request for
/// anything else is NAKed as a whole.
async fn cap(
    server: &str,
    target: &str,
    message: &Message,
    tx: &mpsc::Sender<Message>,
) -> Result<(), ConnectionError> {
    let sub = message.arg(0).unwrap_or_default().to_ascii_uppercase();
    let (verb, caps) = match sub.as_str() {
        "LS" => ("LS", CAPABILITY),
        "REQ" => {
            let requested = message.arg(1).unwrap_or_default();
            let known = requested
                .split_whitespace()
                .all(|cap| cap.eq_ignore_ascii_case(CAPABILITY));
            let verb = if known && !requested.trim().is_empty() {
                "ACK"
            } else {
                "NAK"
            };
            (verb, requested)
        }
        "END" => return Ok(()),
        other => {
            debug!(subcommand = %other, "Unsupported CAP subcommand");
            return Ok(());
        }
    };

    tx.send(Message::new("CAP", [target, verb, caps]).with_prefix(server))
        .await?;
    Ok(())
}

async fn write_loop(
    mut sink: ClientSink,
    mut rx: mpsc::Receiver<Message>,
    closing: CancellationToken,
) {
    loop {
        let message = tokio::select! {
            biased;
            Some(message) = rx.recv() => message,
            _ = closing.cancelled() => break,
        };
        if let Err(e) = sink.send(message.to_string()).await {
            debug!(error = %e, "Client write failed");
            return;
        }
    }

    // Flush what was queued before the client went away.
    while let Ok(message) = rx.try_recv() {
        if sink.send(message.to_string()).await.is_err() {
            return;
        }
    }
    if let Err(e) = sink.close().await {
        debug!(error = %e, "Client close failed");
    }
}
