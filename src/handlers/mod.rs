//! BOUNCER command handlers.
//!
//! The [`BouncerHook`] is the command router: it claims every client frame
//! whose command is `BOUNCER`, halts it so it is never relayed upstream,
//! and dispatches the verb (case-insensitive) to its handler. Unknown verbs
//! are dropped without a reply.

mod buffer;
mod context;
mod network;
pub mod reply;

pub use context::Context;

use crate::error::HandlerResult;
use crate::hooks::{RawEvent, RawHook};
use crate::metrics;
use crate::telemetry::CommandTimer;
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::{Instrument, debug, debug_span};

/// A `BOUNCER` verb handler. `args` are the parameters after the verb.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, ctx: &Context<'_>, args: &[String]) -> HandlerResult;
}

/// Routes `BOUNCER` frames to verb handlers.
pub struct BouncerHook {
    handlers: HashMap<&'static str, Box<dyn Handler>>,
}

impl Default for BouncerHook {
    fn default() -> Self {
        Self::new()
    }
}

impl BouncerHook {
    pub fn new() -> Self {
        let mut handlers: HashMap<&'static str, Box<dyn Handler>> = HashMap::new();

        // Networks
        handlers.insert("listnetworks", Box::new(network::ListNetworksHandler));
        handlers.insert("addnetwork", Box::new(network::AddNetworkHandler));
        handlers.insert("changenetwork", Box::new(network::ChangeNetworkHandler));
        handlers.insert("connect", Box::new(network::ConnectHandler));
        handlers.insert("disconnect", Box::new(network::DisconnectHandler));
        handlers.insert("delnetwork", Box::new(network::DelNetworkHandler));

        // Buffers
        handlers.insert("listbuffers", Box::new(buffer::ListBuffersHandler));
        handlers.insert("changebuffer", Box::new(buffer::ChangeBufferHandler));
        handlers.insert("delbuffer", Box::new(buffer::DelBufferHandler));

        Self { handlers }
    }
}

#[async_trait]
impl RawHook for BouncerHook {
    async fn on_raw(&self, ctx: &Context<'_>, event: &mut RawEvent) {
        if !event.from_client || !event.message.is_command(reply::COMMAND) {
            return;
        }

        // Claimed regardless of what happens next.
        event.halt = true;

        let Some(verb) = event.message.arg(0) else {
            debug!("BOUNCER frame without a verb dropped");
            return;
        };
        let verb = verb.to_ascii_lowercase();
        let Some(handler) = self.handlers.get(verb.as_str()) else {
            debug!(%verb, "Unknown BOUNCER verb dropped");
            return;
        };

        let args = &event.message.params[1..];
        let span = debug_span!("bouncer.command", %verb, user = %ctx.user.name);
        let _timer = CommandTimer::new(verb.as_str());

        let result = handler.handle(ctx, args).instrument(span).await;

        if let Err(e) = result {
            metrics::record_command_error(&verb, e.error_code());
            debug!(%verb, error = %e, "Command rejected");
            if let Some(reply) = e.to_reply(&verb)
                && ctx.sender.send(reply).await.is_err()
            {
                debug!(%verb, "Client gone before rejection could be sent");
            }
        }
    }
}
