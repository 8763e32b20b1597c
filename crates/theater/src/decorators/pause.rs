//! Pacing decorators: fixed debounce and adaptive poll backoff.

use crate::cause::Cause;
use crate::effect::Effect;
use crate::error::{TheaterError, TheaterResult};
use crate::signal::WakeSignal;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Cuts a pacing wait short from outside the decorator.
#[derive(Debug, Clone)]
pub struct Notifier {
    signal: Arc<WakeSignal>,
}

impl Notifier {
    pub fn notify(&self) {
        self.signal.set();
    }
}

/// Minimum spacing between the starts of successive inner checks.
#[derive(Debug)]
struct Pacer {
    period: Duration,
    /// `None` until the first start when the first check must not wait.
    last_start: Mutex<Option<Instant>>,
    signal: Arc<WakeSignal>,
}

impl Pacer {
    fn new(period: Duration, execute_first_time: bool) -> TheaterResult<Self> {
        if period.is_zero() {
            return Err(TheaterError::configuration(
                "pause period must be greater than zero",
            ));
        }

        let last_start = if execute_first_time {
            None
        } else {
            Some(Instant::now())
        };

        Ok(Self {
            period,
            last_start: Mutex::new(last_start),
            signal: Arc::new(WakeSignal::new()),
        })
    }

    fn remaining(&self) -> Duration {
        match *self.last_start.lock() {
            Some(last) => self.period.saturating_sub(last.elapsed()),
            None => Duration::ZERO,
        }
    }

    async fn pace(&self, wait: bool, cancel: &CancellationToken) -> TheaterResult<()> {
        if wait {
            let remaining = self.remaining();
            if !remaining.is_zero() {
                trace!(remaining_ms = remaining.as_millis() as u64, "pausing before check");
                self.signal.wait(Some(remaining), cancel).await?;
            }
        } else if cancel.is_cancelled() {
            return Err(TheaterError::Cancelled);
        }

        self.signal.reset();
        *self.last_start.lock() = Some(Instant::now());
        Ok(())
    }

    fn notifier(&self) -> Notifier {
        Notifier {
            signal: Arc::clone(&self.signal),
        }
    }
}

/// Debounce: the inner check starts at most once per `period`.
///
/// With `execute_first_time` the first check runs immediately, otherwise it
/// waits a full period from construction. [`PauseCause::notify`] ends the
/// current wait early.
#[derive(Debug)]
pub struct PauseCause<C> {
    inner: C,
    pacer: Pacer,
}

impl<C: Cause> PauseCause<C> {
    pub fn new(inner: C, period: Duration, execute_first_time: bool) -> TheaterResult<Self> {
        Ok(Self {
            inner,
            pacer: Pacer::new(period, execute_first_time)?,
        })
    }

    pub fn period(&self) -> Duration {
        self.pacer.period
    }

    pub fn notify(&self) {
        self.pacer.signal.set();
    }

    pub fn notifier(&self) -> Notifier {
        self.pacer.notifier()
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

#[async_trait]
impl<C: Cause> Cause for PauseCause<C> {
    async fn check(&self, cancel: &CancellationToken) -> TheaterResult<Option<Effect>> {
        self.pacer.pace(true, cancel).await?;
        self.inner.check(cancel).await
    }

    fn describe(&self) -> String {
        format!("Pause>{}", self.inner.describe())
    }
}

/// Poll backoff: drains eagerly while the inner cause keeps producing and
/// waits a full period after an empty check.
#[derive(Debug)]
pub struct PollCause<C> {
    inner: C,
    pacer: Pacer,
    previous_found: AtomicBool,
}

impl<C: Cause> PollCause<C> {
    pub fn new(inner: C, period: Duration, execute_first_time: bool) -> TheaterResult<Self> {
        Ok(Self {
            inner,
            pacer: Pacer::new(period, execute_first_time)?,
            previous_found: AtomicBool::new(execute_first_time),
        })
    }

    pub fn period(&self) -> Duration {
        self.pacer.period
    }

    pub fn notify(&self) {
        self.pacer.signal.set();
    }

    pub fn notifier(&self) -> Notifier {
        self.pacer.notifier()
    }
}

#[async_trait]
impl<C: Cause> Cause for PollCause<C> {
    async fn check(&self, cancel: &CancellationToken) -> TheaterResult<Option<Effect>> {
        let wait = !self.previous_found.load(Ordering::Acquire);
        self.pacer.pace(wait, cancel).await?;

        let effect = self.inner.check(cancel).await?;
        self.previous_found.store(effect.is_some(), Ordering::Release);
        Ok(effect)
    }

    fn describe(&self) -> String {
        format!("Poll>{}", self.inner.describe())
    }
}
