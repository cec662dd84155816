//! Network commands: listnetworks, addnetwork, changenetwork, connect,
//! disconnect, delnetwork.

use super::reply::{self, Status};
use super::{Context, Handler};
use crate::error::{HandlerError, HandlerResult, context};
use crate::state::{Identity, Network, NetworkChanges, ServerAddress};
use crate::upstream::{BufferTracker, LinkState, SessionPlan, StartOutcome};
use async_trait::async_trait;
use bnc_proto::{TagBlock, TagBlockWriter};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// `changenetwork` password value that leaves the password unchanged.
const PASSWORD_UNCHANGED: &str = ".";

const DEFAULT_PORT: &str = "6667";

fn network_tags(network: &Network) -> String {
    let primary = network.primary();
    // Listings only distinguish connected from not; `connecting` is reserved
    // for state notifications.
    let (state, current_nick) = match network.link().state() {
        LinkState::Connected { nick } => ("connected", Some(nick)),
        LinkState::Connecting | LinkState::Disconnected => ("disconnected", None),
    };

    TagBlockWriter::new()
        .field("network", &network.name)
        .field("host", &primary.host)
        .field("port", primary.port)
        .field("state", state)
        .field_opt("currentNick", current_nick.as_deref())
        .field("nick", &network.nickname)
        .field("user", &network.username)
        .field("password", &network.password)
        .field("tls", if primary.use_tls { "1" } else { "0" })
        .finish()
}

/// Decode an `addnetwork` tag block. `None` when name, host or port is
/// missing or unusable.
fn network_from_tags(tags: &TagBlock, defaults: &Identity) -> Option<Network> {
    let name = tags.value_or("network", "");
    let host = tags.value_or("host", "");
    let port: u16 = tags.value_or("port", DEFAULT_PORT).parse().unwrap_or(0);
    if name.is_empty() || host.is_empty() || port == 0 {
        return None;
    }

    let mut network = Network::new(
        name,
        ServerAddress {
            host: host.to_string(),
            port,
            use_tls: tags.get("tls") == Some("1"),
            verify_tls: false,
        },
        tags.non_empty("nick").unwrap_or(defaults.nick.as_str()),
        tags.non_empty("user").unwrap_or(defaults.username.as_str()),
        tags.non_empty("realname").unwrap_or(defaults.realname.as_str()),
    );
    network.password = tags.value_or("password", "").to_string();
    Some(network)
}

/// Decode a `changenetwork` tag block into the fields it actually changes.
fn changes_from_tags(tags: &TagBlock) -> NetworkChanges {
    NetworkChanges {
        host: tags.non_empty("host").map(str::to_string),
        port: tags
            .get("port")
            .and_then(|p| p.parse::<u16>().ok())
            .filter(|p| *p > 0),
        password: tags
            .get("password")
            .filter(|p| *p != PASSWORD_UNCHANGED)
            .map(str::to_string),
        nickname: tags.non_empty("nick").map(str::to_string),
        username: tags.non_empty("user").map(str::to_string),
        realname: tags.non_empty("realname").map(str::to_string),
        use_tls: match tags.get("tls") {
            Some("1") => Some(true),
            Some("0") => Some(false),
            _ => None,
        },
    }
}

/// `BOUNCER listnetworks`
pub struct ListNetworksHandler;

#[async_trait]
impl Handler for ListNetworksHandler {
    async fn handle(&self, ctx: &Context<'_>, _args: &[String]) -> HandlerResult {
        let items: Vec<String> = ctx.user.networks().iter().map(network_tags).collect();

        for tags in items {
            ctx.send(reply::item("listnetworks", &[], &tags)).await?;
        }
        ctx.send(reply::end("listnetworks", &[])).await
    }
}

/// `BOUNCER addnetwork <tagblock>`
pub struct AddNetworkHandler;

#[async_trait]
impl Handler for AddNetworkHandler {
    async fn handle(&self, ctx: &Context<'_>, args: &[String]) -> HandlerResult {
        let invalid = || HandlerError::InvalidArgs(context(["*"]));

        let raw = args.first().ok_or_else(invalid)?;
        let tags = TagBlock::parse(raw).map_err(|_| invalid())?;
        let network = network_from_tags(&tags, &ctx.user.defaults).ok_or_else(invalid)?;
        let name = network.name.clone();

        let saved = {
            let mut networks = ctx.user.networks();
            if let Some(existing) = networks.get(&name) {
                return Err(HandlerError::NameInUse(context([existing.name.as_str()])));
            }
            let saved = ctx.bouncer.store.save_network(&ctx.user.name, &network);
            networks.insert(network);
            saved
        };

        if let Err(source) = saved {
            // The network stays usable for this run.
            warn!(user = %ctx.user.name, network = %name, error = %source, "Failed to persist new network");
            return Err(HandlerError::SaveFailed {
                context: context([name.as_str()]),
                what: "network",
                source,
            });
        }

        info!(user = %ctx.user.name, network = %name, "Network added");
        ctx.send(reply::status("addnetwork", &[name.as_str()], Status::Ok))
            .await
    }
}

/// `BOUNCER changenetwork <name> <tagblock>`
pub struct ChangeNetworkHandler;

#[async_trait]
impl Handler for ChangeNetworkHandler {
    async fn handle(&self, ctx: &Context<'_>, args: &[String]) -> HandlerResult {
        let [requested, raw, ..] = args else {
            return Err(HandlerError::InvalidArgs(context(["*"])));
        };
        let tags =
            TagBlock::parse(raw).map_err(|_| HandlerError::InvalidArgs(context(["*"])))?;
        let changes = changes_from_tags(&tags);

        let (name, saved) = {
            let mut networks = ctx.user.networks();
            let Some(network) = networks.get_mut(requested) else {
                return Err(HandlerError::NetworkNotFound(context(["*"])));
            };
            network.apply(&changes);
            let saved = ctx.bouncer.store.save_network(&ctx.user.name, network);
            (network.name.clone(), saved)
        };

        if let Err(source) = saved {
            warn!(user = %ctx.user.name, network = %name, error = %source, "Failed to persist network change");
            return Err(HandlerError::SaveFailed {
                context: context([name.as_str()]),
                what: "network",
                source,
            });
        }

        debug!(user = %ctx.user.name, network = %name, "Network changed");
        ctx.send(reply::status("changenetwork", &[name.as_str()], Status::Ok))
            .await
    }
}

/// `BOUNCER connect <name>`
pub struct ConnectHandler;

#[async_trait]
impl Handler for ConnectHandler {
    async fn handle(&self, ctx: &Context<'_>, args: &[String]) -> HandlerResult {
        let Some(name) = args.first() else {
            return Err(HandlerError::InvalidArgs(context(["*"])));
        };

        // Reserve before locking so `connecting` is queued ahead of anything
        // the connection task sends.
        let permit = ctx.sender.reserve().await?;

        let outcome = {
            let networks = ctx.user.networks();
            let Some(network) = networks.get(name) else {
                return Err(HandlerError::NetworkNotFound(context([name.as_str()])));
            };
            permit.send(reply::state(name, LinkState::Connecting.as_str()));

            let plan = SessionPlan::from_network(network);
            let tracker = BufferTracker::new(ctx.user, Arc::clone(&ctx.bouncer.store), network);
            network.link().start(
                Arc::clone(&ctx.bouncer.connector),
                plan,
                tracker,
                ctx.sender.clone(),
            )
        };

        match outcome {
            StartOutcome::Started => {
                info!(user = %ctx.user.name, network = %name, "Connecting upstream");
                Ok(())
            }
            StartOutcome::AlreadyActive(state @ LinkState::Connected { .. }) => {
                ctx.send(reply::state(name, state.as_str())).await
            }
            StartOutcome::AlreadyActive(_) => Ok(()),
        }
    }
}

/// `BOUNCER disconnect <name>`
pub struct DisconnectHandler;

#[async_trait]
impl Handler for DisconnectHandler {
    async fn handle(&self, ctx: &Context<'_>, args: &[String]) -> HandlerResult {
        let Some(name) = args.first() else {
            return Err(HandlerError::InvalidArgs(context(["*"])));
        };

        let was_active = {
            let networks = ctx.user.networks();
            let Some(network) = networks.get(name) else {
                return Err(HandlerError::NetworkNotFound(context([name.as_str()])));
            };
            network.link().stop()
        };

        if was_active {
            info!(user = %ctx.user.name, network = %name, "Disconnected upstream");
        }
        ctx.send(reply::state(name, LinkState::Disconnected.as_str()))
            .await
    }
}

/// `BOUNCER delnetwork <name>`
pub struct DelNetworkHandler;

#[async_trait]
impl Handler for DelNetworkHandler {
    async fn handle(&self, ctx: &Context<'_>, args: &[String]) -> HandlerResult {
        let Some(name) = args.first() else {
            return Err(HandlerError::NeedsName);
        };

        let deleted = {
            let mut networks = ctx.user.networks();
            let Some(network) = networks.remove(name) else {
                return Err(HandlerError::NetworkNotFound(context([name.as_str()])));
            };
            network.link().stop();
            ctx.bouncer.store.delete_network(&ctx.user.name, &network.name)
        };

        match deleted {
            Ok(true) => info!(user = %ctx.user.name, network = %name, "Network deleted"),
            Ok(false) => debug!(user = %ctx.user.name, network = %name, "Deleted network had no stored record"),
            // Still reported as RPL_OK; the network is gone from this run.
            Err(e) => warn!(user = %ctx.user.name, network = %name, error = %e, "Failed to delete stored network"),
        }

        ctx.send(reply::state(name, LinkState::Disconnected.as_str()))
            .await?;
        ctx.send(reply::status("delnetwork", &[name.as_str()], Status::Ok))
            .await
    }
}
