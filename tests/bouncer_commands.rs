//! End-to-end tests for the BOUNCER control protocol.
//!
//! Each test runs the real `ircbnc` binary on its own port and drives it
//! over TCP like an IRC client would.

mod common;

use common::{FakeUpstream, TestServer};
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::sleep;

#[tokio::test]
async fn test_network_lifecycle() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let server = TestServer::spawn(16671, &dir).await?;
    let mut client = server.attach("al", "alice").await?;

    client
        .send_raw("BOUNCER addnetwork network=freenode;host=irc.freenode.net;port=6667;nick=nick1")
        .await?;
    assert_eq!(client.recv_line().await?, "BOUNCER addnetwork freenode RPL_OK");

    let lines = client.list("BOUNCER listnetworks").await?;
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("network=freenode;host=irc.freenode.net;port=6667;state=disconnected;"));
    assert!(lines[0].contains("nick=nick1;user=alice;password=;tls=0;"));

    client.send_raw("BOUNCER changenetwork FREENODE port=7000").await?;
    assert_eq!(client.recv_line().await?, "BOUNCER changenetwork freenode RPL_OK");
    let lines = client.list("BOUNCER listnetworks").await?;
    assert!(lines[0].contains("port=7000;"));

    client.send_raw("BOUNCER delnetwork freenode").await?;
    assert_eq!(client.recv_line().await?, "BOUNCER state freenode disconnected");
    assert_eq!(client.recv_line().await?, "BOUNCER delnetwork freenode RPL_OK");

    assert_eq!(
        client.list("BOUNCER listnetworks").await?,
        vec!["BOUNCER listnetworks end"]
    );

    client.quit().await?;
    Ok(())
}

#[tokio::test]
async fn test_errors_reach_only_the_issuer() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let server = TestServer::spawn(16672, &dir).await?;
    let mut client = server.attach("al", "alice").await?;

    client.send_raw("BOUNCER addnetwork network=x;port=6667").await?;
    assert_eq!(client.recv_line().await?, "BOUNCER addnetwork * ERR_INVALIDARGS");

    client.send_raw("BOUNCER listbuffers nowhere").await?;
    assert_eq!(client.recv_line().await?, "BOUNCER listbuffers nowhere ERR_NETNOTFOUND");

    client.send_raw("BOUNCER changebuffer nowhere #rust seen=2024-01-02T03:04:05Z").await?;
    assert_eq!(client.recv_line().await?, "BOUNCER changebuffer * * ERR_NETNOTFOUND");

    // Unknown verbs are swallowed; the next reply belongs to the next command.
    client.send_raw("BOUNCER frobnicate").await?;
    client.send_raw("BOUNCER delnetwork").await?;
    assert_eq!(client.recv_line().await?, "BOUNCER delnetwork * ERR_NEEDSNAME");

    Ok(())
}

#[tokio::test]
async fn test_networks_survive_restart_and_stay_per_user() -> anyhow::Result<()> {
    let dir = TempDir::new()?;

    let server = TestServer::spawn(16673, &dir).await?;
    let mut client = server.attach("al", "alice").await?;
    client
        .send_raw("BOUNCER addnetwork network=Libera;host=irc.libera.chat;port=6697;tls=1")
        .await?;
    assert_eq!(client.recv_line().await?, "BOUNCER addnetwork Libera RPL_OK");
    drop(client);
    server.stop();

    let server = TestServer::spawn(16673, &dir).await?;
    let mut alice = server.attach("al", "alice").await?;
    let lines = alice.list("BOUNCER listnetworks").await?;
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("network=Libera;host=irc.libera.chat;port=6697;"));
    assert!(lines[0].ends_with("tls=1;"));

    let mut bob = server.attach("bob", "bob").await?;
    assert_eq!(
        bob.list("BOUNCER listnetworks").await?,
        vec!["BOUNCER listnetworks end"]
    );

    Ok(())
}

#[tokio::test]
async fn test_connect_tracks_buffers() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let server = TestServer::spawn(16674, &dir).await?;
    let upstream = FakeUpstream::bind().await?;
    let mut client = server.attach("al", "alice").await?;

    client
        .send_raw(&format!(
            "BOUNCER addnetwork network=local;host=127.0.0.1;port={}",
            upstream.port()
        ))
        .await?;
    assert_eq!(client.recv_line().await?, "BOUNCER addnetwork local RPL_OK");

    client.send_raw("BOUNCER connect local").await?;
    assert_eq!(client.recv_line().await?, "BOUNCER state local connecting");

    let mut peer = upstream.accept().await?;
    let registration = peer.welcome().await?;
    assert!(registration.contains(&"NICK alice".to_string()));
    assert_eq!(client.recv_line().await?, "BOUNCER state local connected");

    peer.send_raw(":alice!alice@host JOIN #rust").await?;
    peer.send_raw(":irc.fake 332 alice #rust :Rust talk").await?;

    // Buffer tracking runs on the upstream task; poll until it lands.
    let mut lines = Vec::new();
    for _ in 0..20 {
        lines = client.list("BOUNCER listbuffers local").await?;
        if lines.len() == 2 && lines[0].contains("topic=Rust talk;") {
            break;
        }
        sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(lines.len(), 2, "{lines:?}");
    assert!(lines[0].contains("network=local;buffer=#rust;seen=1970-01-01T00:00:00Z;channel=1;"));
    assert!(lines[0].ends_with("joined=1;"));

    client
        .send_raw("BOUNCER changebuffer local #rust seen=2024-01-02T03:04:05Z")
        .await?;
    assert_eq!(client.recv_line().await?, "BOUNCER changebuffer local #rust RPL_OK");
    let lines = client.list("BOUNCER listbuffers local").await?;
    assert!(lines[0].contains("seen=2024-01-02T03:04:05Z;"));

    client.send_raw("BOUNCER disconnect local").await?;
    assert_eq!(client.recv_line().await?, "BOUNCER state local disconnected");

    let mut quit = false;
    while let Ok(line) = peer.recv_line().await {
        if line.starts_with("QUIT") {
            quit = true;
            break;
        }
    }
    assert!(quit, "upstream never saw QUIT");

    client.send_raw("BOUNCER delbuffer local #rust").await?;
    assert_eq!(client.recv_line().await?, "BOUNCER delbuffer local #rust RPL_OK");
    assert_eq!(
        client.list("BOUNCER listbuffers local").await?,
        vec!["BOUNCER listbuffers local end"]
    );

    Ok(())
}
