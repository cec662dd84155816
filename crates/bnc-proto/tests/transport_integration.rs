//! LineCodec + Message over an in-memory duplex stream.

use bnc_proto::{LineCodec, Message, TagBlock};
use futures_util::{SinkExt, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio_util::codec::{Framed, FramedRead};

#[tokio::test]
async fn test_framed_roundtrip_of_bouncer_reply() {
    let (client, server) = tokio::io::duplex(1024);
    let mut client = Framed::new(client, LineCodec::new());
    let mut server = Framed::new(server, LineCodec::new());

    let reply = Message::new(
        "BOUNCER",
        ["listnetworks", "network=libera;host=irc.libera.chat;port=6697;state=disconnected;"],
    );
    server.send(reply.to_string()).await.unwrap();

    let line = client.next().await.unwrap().unwrap();
    let parsed: Message = line.parse().unwrap();
    assert_eq!(parsed, reply);

    let tags = TagBlock::parse(parsed.arg(1).unwrap()).unwrap();
    assert_eq!(tags.get("state"), Some("disconnected"));
}

#[tokio::test]
async fn test_split_writes_are_reassembled() {
    let (mut writer, reader) = tokio::io::duplex(64);
    let mut lines = FramedRead::new(reader, LineCodec::new());

    writer.write_all(b"BOUNCER conn").await.unwrap();
    writer.write_all(b"ect libera\r\nBOUNCER listnetworks\n").await.unwrap();
    drop(writer);

    assert_eq!(lines.next().await.unwrap().unwrap(), "BOUNCER connect libera");
    assert_eq!(lines.next().await.unwrap().unwrap(), "BOUNCER listnetworks");
    assert!(lines.next().await.is_none());
}
