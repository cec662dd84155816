//! Raw message hooks.
//!
//! Every frame read from a registered client passes through the [`HookBus`]
//! before it would be relayed upstream. A hook that sets [`RawEvent::halt`]
//! consumes the frame; later hooks and the relay path never see it.

use crate::handlers::Context;
use async_trait::async_trait;
use bnc_proto::Message;

/// A raw frame travelling through the bouncer.
#[derive(Debug)]
pub struct RawEvent {
    /// Whether the frame came from a client (as opposed to upstream).
    pub from_client: bool,
    pub message: Message,
    /// Stop further processing of this frame.
    pub halt: bool,
}

impl RawEvent {
    pub fn from_client(message: Message) -> Self {
        Self {
            from_client: true,
            message,
            halt: false,
        }
    }
}

/// A hook that can inspect, answer and halt raw frames.
#[async_trait]
pub trait RawHook: Send + Sync {
    async fn on_raw(&self, ctx: &Context<'_>, event: &mut RawEvent);
}

/// Ordered set of raw hooks.
#[derive(Default)]
pub struct HookBus {
    hooks: Vec<Box<dyn RawHook>>,
}

impl HookBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, hook: impl RawHook + 'static) {
        self.hooks.push(Box::new(hook));
    }

    /// Run hooks in registration order until one halts the event.
    pub async fn dispatch(&self, ctx: &Context<'_>, event: &mut RawEvent) {
        for hook in &self.hooks {
            hook.on_raw(ctx, event).await;
            if event.halt {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::Harness;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        seen: Arc<AtomicUsize>,
        halt: bool,
    }

    #[async_trait]
    impl RawHook for Counting {
        async fn on_raw(&self, _ctx: &Context<'_>, event: &mut RawEvent) {
            self.seen.fetch_add(1, Ordering::SeqCst);
            event.halt = self.halt;
        }
    }

    #[tokio::test]
    async fn test_dispatch_stops_at_first_halt() {
        let harness = Harness::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let mut bus = HookBus::new();
        bus.register(Counting {
            seen: first.clone(),
            halt: true,
        });
        bus.register(Counting {
            seen: second.clone(),
            halt: false,
        });

        let mut event = RawEvent::from_client("PRIVMSG #rust :hi".parse().unwrap());
        bus.dispatch(&harness.context(), &mut event).await;

        assert!(event.halt);
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dispatch_runs_all_hooks_without_halt() {
        let harness = Harness::new();
        let seen = Arc::new(AtomicUsize::new(0));

        let mut bus = HookBus::new();
        for _ in 0..2 {
            bus.register(Counting {
                seen: seen.clone(),
                halt: false,
            });
        }

        let mut event = RawEvent::from_client("PING x".parse().unwrap());
        bus.dispatch(&harness.context(), &mut event).await;

        assert!(!event.halt);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }
}
