//! In-memory FIFO exposed as a cause.

use crate::cause::Cause;
use crate::effect::{short_type_name, Effect, EffectValue};
use crate::error::{TheaterError, TheaterResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueMode {
    /// One element per check, converted into an effect.
    Single,
    /// Up to `n` elements per check, wrapped in a batch effect.
    Batched(usize),
}

/// Unbounded queue drained by checks. Never blocks.
pub struct QueueCause<T> {
    queue: Mutex<VecDeque<T>>,
    mode: QueueMode,
    into_effect: fn(T) -> Effect,
}

impl<T: Into<Effect>> QueueCause<T> {
    /// Elements are effects in their own right and are handed out one by one.
    pub fn single() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            mode: QueueMode::Single,
            into_effect: Into::into,
        }
    }
}

impl<T: EffectValue> QueueCause<T> {
    /// Elements are wrapped as single-value effects, `batch_size` per batch.
    pub fn batched(batch_size: usize) -> TheaterResult<Self> {
        if batch_size == 0 {
            return Err(TheaterError::configuration(
                "batch size must be greater than zero",
            ));
        }

        Ok(Self {
            queue: Mutex::new(VecDeque::new()),
            mode: QueueMode::Batched(batch_size),
            into_effect: Effect::value,
        })
    }
}

impl<T> QueueCause<T> {
    pub fn enqueue(&self, element: T) {
        self.queue.lock().push_back(element);
    }

    pub fn enqueue_all<I: IntoIterator<Item = T>>(&self, elements: I) {
        self.queue.lock().extend(elements);
    }

    pub fn dequeue(&self) -> Option<T> {
        self.queue.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    pub fn mode(&self) -> QueueMode {
        self.mode
    }
}

#[async_trait]
impl<T: Send + 'static> Cause for QueueCause<T> {
    async fn check(&self, _cancel: &CancellationToken) -> TheaterResult<Option<Effect>> {
        match self.mode {
            QueueMode::Single => Ok(self.dequeue().map(self.into_effect)),
            QueueMode::Batched(size) => {
                let batch: Vec<Effect> = {
                    let mut queue = self.queue.lock();
                    let take = size.min(queue.len());
                    queue.drain(..take).map(self.into_effect).collect()
                };
                Ok((!batch.is_empty()).then(|| Effect::batch(batch)))
            }
        }
    }

    fn describe(&self) -> String {
        format!("Queue<{}>", short_type_name::<T>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::TimerElapsed;
    use std::time::Duration;
    use tokio::time::Instant;

    #[tokio::test]
    async fn single_mode_hands_out_effects_in_order() {
        let queue = QueueCause::<Effect>::single();
        queue.enqueue(Effect::value(1u8));
        queue.enqueue(Effect::value(2u8));
        let token = CancellationToken::new();

        let first = queue.check(&token).await.unwrap().unwrap();
        let second = queue.check(&token).await.unwrap().unwrap();

        assert_eq!(first.downcast_ref::<u8>(), Some(&1));
        assert_eq!(second.downcast_ref::<u8>(), Some(&2));
        assert!(queue.check(&token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn single_mode_accepts_effect_shaped_elements() {
        let queue = QueueCause::<TimerElapsed>::single();
        queue.enqueue(TimerElapsed {
            elapsed: Instant::now(),
            interval: Duration::from_secs(1),
        });

        let effect = queue.check(&CancellationToken::new()).await.unwrap().unwrap();
        assert!(effect.as_timer().is_some());
    }

    #[tokio::test]
    async fn batch_stops_early_when_queue_runs_dry() {
        let queue = QueueCause::batched(4).unwrap();
        queue.enqueue_all(["a", "b", "c", "d", "e"]);
        let token = CancellationToken::new();

        let full = queue.check(&token).await.unwrap().unwrap();
        assert_eq!(full.as_batch().unwrap().len(), 4);

        let rest = queue.check(&token).await.unwrap().unwrap();
        let rest = rest.as_batch().unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].downcast_ref::<&str>(), Some(&"e"));

        assert!(queue.check(&token).await.unwrap().is_none());
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        assert!(matches!(
            QueueCause::<u32>::batched(0),
            Err(TheaterError::Configuration(_))
        ));
    }

    #[test]
    fn dequeue_is_non_blocking() {
        let queue = QueueCause::<u32>::batched(2).unwrap();
        assert!(queue.is_empty());
        assert_eq!(queue.dequeue(), None);
        queue.enqueue(7);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.dequeue(), Some(7));
    }
}
