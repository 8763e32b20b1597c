//! Admission control for the pooled character.

use crate::config::MIN_POLL_INTERVAL;
use crate::error::{TheaterError, TheaterResult};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Bounded counter of active units.
///
/// `0 <= active <= max` holds at all times; the count only changes under the
/// mutex. Waiters are woken one at a time on release and also re-check on a
/// fixed interval in case a wake-up was missed.
#[derive(Debug)]
pub struct AdmissionPool {
    active: Mutex<usize>,
    max: usize,
    released: Notify,
    poll_interval: Duration,
}

/// A reserved slot. Dropping it releases the slot and wakes one waiter.
#[derive(Debug)]
pub struct Slot {
    pool: Arc<AdmissionPool>,
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.pool.release();
    }
}

impl AdmissionPool {
    pub fn new(max: usize, poll_interval: Duration) -> TheaterResult<Arc<Self>> {
        if max == 0 {
            return Err(TheaterError::configuration(
                "max concurrency must be greater than zero",
            ));
        }

        Ok(Arc::new(Self {
            active: Mutex::new(0),
            max,
            released: Notify::new(),
            poll_interval: poll_interval.max(MIN_POLL_INTERVAL),
        }))
    }

    pub fn max(&self) -> usize {
        self.max
    }

    pub fn active(&self) -> usize {
        *self.active.lock()
    }

    /// Non-reserving capacity check.
    pub fn has_capacity(&self) -> bool {
        *self.active.lock() < self.max
    }

    pub fn try_acquire(self: &Arc<Self>) -> Option<Slot> {
        let mut active = self.active.lock();
        if *active >= self.max {
            return None;
        }
        *active += 1;
        Some(Slot {
            pool: Arc::clone(self),
        })
    }

    /// Reserve a slot, waiting until one frees up or `cancel` fires.
    pub async fn acquire(self: &Arc<Self>, cancel: &CancellationToken) -> TheaterResult<Slot> {
        loop {
            let released = self.released.notified();
            tokio::pin!(released);
            released.as_mut().enable();

            if let Some(slot) = self.try_acquire() {
                return Ok(slot);
            }

            trace!(active = self.active(), max = self.max, "waiting for a free slot");
            self.wait_for_release(released, cancel).await?;
        }
    }

    /// Wait until at least one slot is free without reserving it.
    pub async fn wait_for_capacity(&self, cancel: &CancellationToken) -> TheaterResult<()> {
        loop {
            let released = self.released.notified();
            tokio::pin!(released);
            released.as_mut().enable();

            if self.has_capacity() {
                return Ok(());
            }

            self.wait_for_release(released, cancel).await?;
        }
    }

    async fn wait_for_release(
        &self,
        released: std::pin::Pin<&mut tokio::sync::futures::Notified<'_>>,
        cancel: &CancellationToken,
    ) -> TheaterResult<()> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TheaterError::Cancelled),
            _ = released => Ok(()),
            _ = tokio::time::sleep(self.poll_interval) => Ok(()),
        }
    }

    fn release(&self) {
        {
            let mut active = self.active.lock();
            *active = active.saturating_sub(1);
        }
        self.released.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn zero_capacity_is_rejected() {
        let err = AdmissionPool::new(0, MIN_POLL_INTERVAL).unwrap_err();
        assert!(matches!(err, TheaterError::Configuration(_)));
    }

    #[test]
    fn slots_are_bounded_and_released_on_drop() {
        let pool = AdmissionPool::new(2, MIN_POLL_INTERVAL).unwrap();
        let a = pool.try_acquire().unwrap();
        let _b = pool.try_acquire().unwrap();

        assert!(!pool.has_capacity());
        assert!(pool.try_acquire().is_none());

        drop(a);
        assert_eq!(pool.active(), 1);
        assert!(pool.has_capacity());
    }

    #[tokio::test(start_paused = true)]
    async fn release_wakes_exactly_one_waiter() {
        let pool = AdmissionPool::new(1, Duration::from_secs(3600)).unwrap();
        let held = pool.try_acquire().unwrap();
        let token = CancellationToken::new();
        let admitted = Arc::new(AtomicUsize::new(0));

        let mut waiters = Vec::new();
        for _ in 0..2 {
            let pool = Arc::clone(&pool);
            let token = token.clone();
            let admitted = Arc::clone(&admitted);
            waiters.push(tokio::spawn(async move {
                let slot = pool.acquire(&token).await;
                admitted.fetch_add(1, Ordering::SeqCst);
                // Hold the slot until cancelled.
                token.cancelled().await;
                drop(slot);
            }));
        }

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(admitted.load(Ordering::SeqCst), 0);

        drop(held);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(admitted.load(Ordering::SeqCst), 1);
        assert_eq!(pool.active(), 1);

        token.cancel();
        for waiter in waiters {
            waiter.await.unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_observes_cancellation() {
        let pool = AdmissionPool::new(1, MIN_POLL_INTERVAL).unwrap();
        let _held = pool.try_acquire().unwrap();
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            canceller.cancel();
        });

        assert!(pool.acquire(&token).await.unwrap_err().is_cancelled());
        assert_eq!(pool.active(), 1);
    }
}
