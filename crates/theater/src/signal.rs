//! Cancellable waiting primitives.

use crate::error::{TheaterError, TheaterResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Manual-reset event. Once set it stays set, waking every current and future
/// waiter, until [`WakeSignal::reset`] is called.
#[derive(Debug, Default)]
pub struct WakeSignal {
    flag: AtomicBool,
    notify: Notify,
}

impl WakeSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Wait until the signal is set, `timeout` elapses or `cancel` fires.
    ///
    /// Returns `Ok(true)` when signalled, `Ok(false)` on timeout and
    /// `Err(Cancelled)` on cancellation. `None` waits without a timeout.
    pub async fn wait(
        &self,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> TheaterResult<bool> {
        if cancel.is_cancelled() {
            return Err(TheaterError::Cancelled);
        }

        let notified = self.notify.notified();
        tokio::pin!(notified);
        // Register interest before reading the flag so a concurrent set() is not lost.
        notified.as_mut().enable();
        if self.is_set() {
            return Ok(true);
        }

        match timeout {
            Some(timeout) => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(TheaterError::Cancelled),
                    _ = &mut notified => Ok(true),
                    _ = tokio::time::sleep(timeout) => Ok(self.is_set()),
                }
            }
            None => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(TheaterError::Cancelled),
                    _ = &mut notified => Ok(true),
                }
            }
        }
    }
}

/// Sleep for `duration` unless cancelled first.
pub async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> TheaterResult<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(TheaterError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}
