//! Buffer commands: listbuffers, changebuffer, delbuffer.

use super::reply::{self, Status};
use super::{Context, Handler};
use crate::error::{HandlerError, HandlerResult, context};
use crate::state::{Buffer, format_seen, parse_seen};
use async_trait::async_trait;
use bnc_proto::{TagBlock, TagBlockWriter};
use tracing::{debug, warn};

fn buffer_tags(network: &str, buffer: &Buffer) -> String {
    let tags = TagBlockWriter::new()
        .field("network", network)
        .field("buffer", &buffer.name)
        .field("seen", format_seen(&buffer.last_seen()));

    if buffer.channel {
        tags.field("channel", "1")
            .field("topic", &buffer.topic)
            .field("joined", if buffer.joined { "1" } else { "0" })
            .finish()
    } else {
        tags.finish()
    }
}

/// `BOUNCER listbuffers <network>`
pub struct ListBuffersHandler;

#[async_trait]
impl Handler for ListBuffersHandler {
    async fn handle(&self, ctx: &Context<'_>, args: &[String]) -> HandlerResult {
        let Some(requested) = args.first() else {
            return Err(HandlerError::InvalidArgs(context(["*"])));
        };

        let (name, items) = {
            let networks = ctx.user.networks();
            let Some(network) = networks.get(requested) else {
                return Err(HandlerError::NetworkNotFound(context([requested.as_str()])));
            };
            let items: Vec<String> = network
                .buffers
                .iter()
                .map(|b| buffer_tags(&network.name, b))
                .collect();
            (network.name.clone(), items)
        };

        for tags in items {
            ctx.send(reply::item("listbuffers", &[requested.as_str()], &tags))
                .await?;
        }
        ctx.send(reply::end("listbuffers", &[name.as_str()])).await
    }
}

/// `BOUNCER changebuffer <network> <buffer> <tagblock>`
pub struct ChangeBufferHandler;

#[async_trait]
impl Handler for ChangeBufferHandler {
    async fn handle(&self, ctx: &Context<'_>, args: &[String]) -> HandlerResult {
        let [network_name, buffer_name, raw, ..] = args else {
            return Err(HandlerError::InvalidArgs(context(["*", "*"])));
        };
        let tags = TagBlock::parse(raw)
            .map_err(|_| HandlerError::InvalidArgs(context(["*", "*"])))?;

        // An unparseable time is logged and otherwise ignored.
        let seen = tags.non_empty("seen").and_then(|raw| match parse_seen(raw) {
            Ok(ts) => Some(ts),
            Err(e) => {
                warn!(user = %ctx.user.name, seen = %raw, error = %e, "Ignoring unparseable seen time");
                None
            }
        });

        let (network, buffer, saved) = {
            let mut networks = ctx.user.networks();
            let Some(network) = networks.get_mut(network_name) else {
                return Err(HandlerError::NetworkNotFound(context(["*", "*"])));
            };
            let Some(buffer) = network.buffers.get_mut(buffer_name) else {
                return Err(HandlerError::BufferNotFound(context(["*", "*"])));
            };
            if let Some(ts) = seen {
                buffer.set_last_seen(ts);
            }
            let buffer = buffer.name.clone();
            let saved = ctx.bouncer.store.save_network(&ctx.user.name, network);
            (network.name.clone(), buffer, saved)
        };

        if let Err(source) = saved {
            warn!(user = %ctx.user.name, network = %network, buffer = %buffer, error = %source, "Failed to persist buffer change");
            return Err(HandlerError::SaveFailed {
                context: context([network.as_str(), buffer.as_str()]),
                what: "buffer",
                source,
            });
        }

        ctx.send(reply::status(
            "changebuffer",
            &[network.as_str(), buffer.as_str()],
            Status::Ok,
        ))
        .await
    }
}

/// `BOUNCER delbuffer <network> <buffer>`
///
/// Succeeds whether or not the buffer existed; the network is saved either way.
pub struct DelBufferHandler;

#[async_trait]
impl Handler for DelBufferHandler {
    async fn handle(&self, ctx: &Context<'_>, args: &[String]) -> HandlerResult {
        let [network_name, buffer_name, ..] = args else {
            return Err(HandlerError::InvalidArgs(context(["*", "*"])));
        };

        {
            let mut networks = ctx.user.networks();
            let Some(network) = networks.get_mut(network_name) else {
                return Err(HandlerError::NetworkNotFound(context([
                    network_name.as_str(),
                    "*",
                ])));
            };
            if network.buffers.remove(buffer_name).is_some() {
                debug!(user = %ctx.user.name, network = %network.name, buffer = %buffer_name, "Buffer deleted");
            }
            if let Err(e) = ctx.bouncer.store.save_network(&ctx.user.name, network) {
                warn!(user = %ctx.user.name, network = %network.name, error = %e, "Failed to persist buffer removal");
            }
        }

        ctx.send(reply::status(
            "delbuffer",
            &[network_name.as_str(), buffer_name.as_str()],
            Status::Ok,
        ))
        .await
    }
}
