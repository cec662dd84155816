//! Handler context.

use crate::error::HandlerResult;
use crate::state::{Bouncer, User};
use bnc_proto::Message;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Everything a command handler can reach.
pub struct Context<'a> {
    /// Shared server state.
    pub bouncer: &'a Arc<Bouncer>,
    /// The user the issuing client is attached to.
    pub user: &'a Arc<User>,
    /// Sender for outgoing messages to this client.
    pub sender: &'a mpsc::Sender<Message>,
}

impl Context<'_> {
    /// Queue a message to the client.
    pub async fn send(&self, message: Message) -> HandlerResult {
        self.sender.send(message).await?;
        Ok(())
    }
}
