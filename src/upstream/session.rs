//! The task driving one upstream connection.

use super::{BufferTracker, Connector, Link, LinkState, UpstreamError, UpstreamStream};
use crate::handlers::reply;
use crate::state::{Network, ServerAddress};
use bnc_proto::{LineCodec, Message};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

type Upstream = Framed<UpstreamStream, LineCodec>;

const QUIT_TIMEOUT: Duration = Duration::from_secs(2);

/// Snapshot of what a connection attempt needs, taken under the owner's lock.
#[derive(Debug, Clone)]
pub struct SessionPlan {
    pub network: String,
    pub addresses: Vec<ServerAddress>,
    pub password: String,
    pub nickname: String,
    pub username: String,
    pub realname: String,
}

impl SessionPlan {
    pub fn from_network(network: &Network) -> Self {
        Self {
            network: network.name.clone(),
            addresses: network.addresses().to_vec(),
            password: network.password.clone(),
            nickname: network.nickname.clone(),
            username: network.username.clone(),
            realname: network.realname.clone(),
        }
    }
}

pub(super) async fn run(
    link: Arc<Link>,
    generation: u64,
    cancel: CancellationToken,
    connector: Arc<Connector>,
    plan: SessionPlan,
    tracker: BufferTracker,
    notify: mpsc::Sender<Message>,
) {
    let span = info_span!("upstream", network = %plan.network);
    async move {
        let established = tokio::select! {
            _ = cancel.cancelled() => return,
            result = establish(&connector, &plan) => result,
        };

        let (mut upstream, nick) = match established {
            Ok(established) => established,
            Err(e) => {
                warn!(error = %e, "Upstream connection failed");
                report_down(&link, generation, &plan.network, &tracker, &notify).await;
                return;
            }
        };

        if !link.transition(generation, LinkState::Connected { nick: nick.clone() }) {
            // Stopped while registering.
            send_quit(&mut upstream).await;
            return;
        }
        info!(%nick, "Upstream registered");
        let _ = notify
            .send(reply::state(&plan.network, LinkState::Connected { nick: nick.clone() }.as_str()))
            .await;

        match relay(&mut upstream, &link, generation, &cancel, &tracker, nick).await {
            Ok(()) => {
                debug!("Upstream link stopped");
                send_quit(&mut upstream).await;
                tracker.reset_joined();
            }
            Err(e) => {
                warn!(error = %e, "Upstream session ended");
                report_down(&link, generation, &plan.network, &tracker, &notify).await;
            }
        }
    }
    .instrument(span)
    .await
}

/// Try each address in order until one connects and registers.
async fn establish(
    connector: &Connector,
    plan: &SessionPlan,
) -> Result<(Upstream, String), UpstreamError> {
    let mut last_error = UpstreamError::NoAddress;

    for address in &plan.addresses {
        match attempt(connector, address, plan).await {
            Ok(established) => return Ok(established),
            Err(e) => {
                debug!(host = %address.host, port = address.port, error = %e, "Address failed");
                last_error = e;
            }
        }
    }

    Err(last_error)
}

/// Connect to one address and register on it.
async fn attempt(
    connector: &Connector,
    address: &ServerAddress,
    plan: &SessionPlan,
) -> Result<(Upstream, String), UpstreamError> {
    let stream = connector.open(address).await?;
    info!(host = %address.host, port = address.port, tls = stream.is_tls(), "Connected to upstream");

    let mut upstream = Framed::new(stream, LineCodec::with_max_len(connector.max_line_len()));
    let nick = timeout(connector.register_timeout(), register(&mut upstream, plan))
        .await
        .map_err(|_| UpstreamError::Timeout("registration"))??;
    Ok((upstream, nick))
}

async fn send(upstream: &mut Upstream, message: Message) -> Result<(), UpstreamError> {
    upstream.send(message.to_string()).await?;
    Ok(())
}

/// Send PASS/NICK/USER and wait for the welcome. Returns the welcomed nick.
async fn register(upstream: &mut Upstream, plan: &SessionPlan) -> Result<String, UpstreamError> {
    if !plan.password.is_empty() {
        send(upstream, Message::new("PASS", [plan.password.as_str()])).await?;
    }
    let mut nick = plan.nickname.clone();
    send(upstream, Message::new("NICK", [nick.as_str()])).await?;
    send(
        upstream,
        Message::new(
            "USER",
            [plan.username.as_str(), "0", "*", plan.realname.as_str()],
        ),
    )
    .await?;

    loop {
        let line = upstream.next().await.ok_or(UpstreamError::Closed)??;
        let message: Message = match line.parse() {
            Ok(message) => message,
            Err(e) => {
                debug!(error = %e, "Unparseable upstream line");
                continue;
            }
        };

        match message.command.as_str() {
            "001" => return Ok(message.arg(0).unwrap_or(nick.as_str()).to_string()),
            "PING" => send(upstream, Message::new("PONG", message.params.clone())).await?,
            // ERR_NICKNAMEINUSE
            "433" => {
                nick.push('_');
                send(upstream, Message::new("NICK", [nick.as_str()])).await?;
            }
            "ERROR" => {
                return Err(UpstreamError::Rejected(
                    message.arg(0).unwrap_or_default().to_string(),
                ));
            }
            _ => {}
        }
    }
}

/// Serve a registered session until it is cancelled (`Ok`) or fails.
async fn relay(
    upstream: &mut Upstream,
    link: &Link,
    generation: u64,
    cancel: &CancellationToken,
    tracker: &BufferTracker,
    mut nick: String,
) -> Result<(), UpstreamError> {
    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            line = upstream.next() => line,
        };
        let line = line.ok_or(UpstreamError::Closed)??;
        let Ok(message) = line.parse::<Message>() else {
            continue;
        };

        match message.command.as_str() {
            "PING" => send(upstream, Message::new("PONG", message.params.clone())).await?,
            "NICK" if message
                .source_nickname()
                .is_some_and(|source| bnc_proto::irc_eq(source, &nick)) =>
            {
                if let Some(new_nick) = message.arg(0) {
                    nick = new_nick.to_string();
                    link.set_nick(generation, &nick);
                }
            }
            "ERROR" => {
                return Err(UpstreamError::Rejected(
                    message.arg(0).unwrap_or_default().to_string(),
                ));
            }
            _ => tracker.observe(&message, &nick),
        }
    }
}

async fn send_quit(upstream: &mut Upstream) {
    let quit = Message::new("QUIT", ["Disconnecting"]);
    if timeout(QUIT_TIMEOUT, send(upstream, quit)).await.is_err() {
        debug!("QUIT not delivered before timeout");
    }
}

/// Mark the link down and tell the client, unless a newer start or a stop
/// already took over.
async fn report_down(
    link: &Link,
    generation: u64,
    network: &str,
    tracker: &BufferTracker,
    notify: &mpsc::Sender<Message>,
) {
    if link.transition(generation, LinkState::Disconnected) {
        tracker.reset_joined();
        let _ = notify
            .send(reply::state(network, LinkState::Disconnected.as_str()))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UpstreamConfig;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    fn local(port: u16) -> ServerAddress {
        ServerAddress {
            host: "127.0.0.1".into(),
            port,
            use_tls: false,
            verify_tls: false,
        }
    }

    fn plan(addresses: Vec<ServerAddress>) -> SessionPlan {
        SessionPlan {
            network: "multi".into(),
            addresses,
            password: String::new(),
            nickname: "alice".into(),
            username: "alice".into(),
            realname: "Alice".into(),
        }
    }

    fn connector() -> Connector {
        Connector::new(&UpstreamConfig {
            connect_timeout_secs: 2,
            register_timeout_secs: 2,
            max_line_len: 8191,
        })
    }

    /// Accept one client and answer its USER line with `reply`.
    async fn answer_user(listener: TcpListener, reply: &'static str) {
        let (stream, _) = listener.accept().await.unwrap();
        let (read, mut write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.starts_with("USER") {
                write.write_all(reply.as_bytes()).await.unwrap();
            }
        }
    }

    #[tokio::test]
    async fn test_rejected_primary_falls_back() {
        let primary = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let fallback = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addresses = vec![
            local(primary.local_addr().unwrap().port()),
            local(fallback.local_addr().unwrap().port()),
        ];
        tokio::spawn(answer_user(primary, "ERROR :Closing link (K-lined)\r\n"));
        tokio::spawn(answer_user(fallback, ":irc.test 001 alice :Welcome\r\n"));

        let (_upstream, nick) = establish(&connector(), &plan(addresses)).await.unwrap();
        assert_eq!(nick, "alice");
    }

    #[tokio::test]
    async fn test_last_failure_is_reported() {
        let primary = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let addresses = vec![local(dead), local(primary.local_addr().unwrap().port())];
        tokio::spawn(answer_user(primary, "ERROR :Closing link (K-lined)\r\n"));

        let Err(err) = establish(&connector(), &plan(addresses)).await else {
            panic!("registration unexpectedly succeeded");
        };
        assert!(matches!(err, UpstreamError::Rejected(reason) if reason.contains("K-lined")));
    }

    #[tokio::test]
    async fn test_no_addresses() {
        let Err(err) = establish(&connector(), &plan(Vec::new())).await else {
            panic!("no address should fail");
        };
        assert!(matches!(err, UpstreamError::NoAddress));
    }
}
