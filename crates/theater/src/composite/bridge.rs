//! Push-to-pull bridge: bus messages in, effects out.

use crate::cause::Cause;
use crate::effect::{short_type_name, Effect, EffectValue};
use crate::error::TheaterResult;
use crate::signal::WakeSignal;
use async_trait::async_trait;
use common::{Bus, MessageHandler};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Bus message carrying one payload for a [`BridgeCause`].
#[derive(Debug, Clone)]
pub struct PushMessage<T> {
    pub payload: T,
}

impl<T> PushMessage<T> {
    pub fn new(payload: T) -> Self {
        Self { payload }
    }
}

/// Queues pushed payloads and hands them out one per check.
///
/// A check on an empty queue blocks until something is pushed (or the token
/// is cancelled) and then returns `None`; the payload that woke it is handed
/// out by the following check.
pub struct BridgeCause<T> {
    queue: Mutex<VecDeque<T>>,
    signal: WakeSignal,
}

impl<T> Default for BridgeCause<T> {
    fn default() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            signal: WakeSignal::new(),
        }
    }
}

impl<T: EffectValue + Clone> BridgeCause<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, payload: T) {
        self.queue.lock().push_back(payload);
        self.signal.set();
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Subscribe to `PushMessage<T>` on `bus`.
    pub fn attach(self: &Arc<Self>, bus: &Bus) {
        bus.register_handler::<PushMessage<T>, Self>(Arc::clone(self));
    }

    pub fn detach(self: &Arc<Self>, bus: &Bus) -> bool {
        bus.unregister_handler::<PushMessage<T>, Self>(self)
    }
}

impl<T: EffectValue + Clone> MessageHandler<PushMessage<T>> for BridgeCause<T> {
    fn handle(&self, message: &PushMessage<T>) -> anyhow::Result<()> {
        self.push(message.payload.clone());
        Ok(())
    }
}

#[async_trait]
impl<T: EffectValue + Clone> Cause for BridgeCause<T> {
    async fn check(&self, cancel: &CancellationToken) -> TheaterResult<Option<Effect>> {
        let next = self.queue.lock().pop_front();
        if let Some(payload) = next {
            return Ok(Some(Effect::value(payload)));
        }

        self.signal.wait(None, cancel).await?;
        self.signal.reset();
        trace!("bridge woken by push");
        Ok(None)
    }

    fn describe(&self) -> String {
        format!("Bridge<{}>", short_type_name::<T>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    struct Status(&'static str);

    #[tokio::test]
    async fn queued_payload_is_returned_immediately() {
        let bridge = BridgeCause::new();
        bridge.push(Status("ready"));

        let effect = bridge.check(&CancellationToken::new()).await.unwrap().unwrap();
        assert_eq!(effect.downcast_ref::<Status>(), Some(&Status("ready")));
    }

    #[tokio::test(start_paused = true)]
    async fn wake_returns_none_then_next_check_drains() {
        let bridge = Arc::new(BridgeCause::new());
        let token = CancellationToken::new();

        let pusher = Arc::clone(&bridge);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            pusher.push(Status("late"));
        });

        assert!(bridge.check(&token).await.unwrap().is_none());
        let effect = bridge.check(&token).await.unwrap().unwrap();
        assert_eq!(effect.downcast_ref::<Status>(), Some(&Status("late")));
    }

    #[tokio::test]
    async fn bus_messages_reach_the_bridge() {
        let bus = Bus::new();
        let bridge = Arc::new(BridgeCause::<u64>::new());
        bridge.attach(&bus);

        bus.send(PushMessage::new(42u64));
        assert_eq!(bridge.pending(), 1);

        assert!(bridge.detach(&bus));
        bus.send(PushMessage::new(43u64));
        assert_eq!(bridge.pending(), 1);
    }

    #[tokio::test]
    async fn empty_bridge_observes_cancellation() {
        let bridge = BridgeCause::<u8>::new();
        let token = CancellationToken::new();
        token.cancel();
        assert!(bridge.check(&token).await.unwrap_err().is_cancelled());
    }
}
