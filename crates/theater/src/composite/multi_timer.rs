//! Aggregates several repeating intervals into one cause.

use crate::cause::Cause;
use crate::effect::Effect;
use crate::error::{TheaterError, TheaterResult};
use crate::signal::WakeSignal;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
struct Interval {
    duration: Duration,
    due: Instant,
}

impl Interval {
    /// Reschedule one period after the nominal fire time, never into the past,
    /// so a long stall does not cause a burst of catch-up fires.
    fn fire(&mut self, now: Instant) -> Effect {
        let elapsed = self.due;
        self.due = (elapsed + self.duration).max(now);
        debug!(
            interval_ms = self.duration.as_millis() as u64,
            late_ms = now.saturating_duration_since(elapsed).as_millis() as u64,
            "timer elapsed"
        );
        Effect::timer(elapsed, self.duration)
    }
}

/// Timer set with one timer-fired effect per elapsed interval.
///
/// In blocking mode a registered interval falls due at once and then repeats
/// every period. A check waits for the earliest interval; registering a new
/// interval wakes the wait so the new one can be considered. In non-blocking
/// mode an interval first falls due one period after registration and a check
/// returns `None` when nothing is due.
#[derive(Debug)]
pub struct MultiTimerCause {
    intervals: Mutex<Vec<Interval>>,
    signal: WakeSignal,
    blocking: bool,
}

impl MultiTimerCause {
    pub fn new(blocking: bool) -> Self {
        Self {
            intervals: Mutex::new(Vec::new()),
            signal: WakeSignal::new(),
            blocking,
        }
    }

    pub fn blocking() -> Self {
        Self::new(true)
    }

    pub fn non_blocking() -> Self {
        Self::new(false)
    }

    pub fn is_blocking(&self) -> bool {
        self.blocking
    }

    pub fn add_interval(&self, duration: Duration) -> TheaterResult<()> {
        if duration.is_zero() {
            return Err(TheaterError::configuration(
                "interval must be greater than zero",
            ));
        }

        {
            let mut intervals = self.intervals.lock();
            if intervals.iter().any(|i| i.duration == duration) {
                return Err(TheaterError::configuration(format!(
                    "interval {duration:?} is already registered"
                )));
            }
            let now = Instant::now();
            let due = if self.blocking { now } else { now + duration };
            intervals.push(Interval { duration, due });
        }

        self.signal.set();
        Ok(())
    }

    pub fn with_interval(self, duration: Duration) -> TheaterResult<Self> {
        self.add_interval(duration)?;
        Ok(self)
    }

    pub fn intervals(&self) -> Vec<Duration> {
        self.intervals.lock().iter().map(|i| i.duration).collect()
    }

    /// Next time the interval of `duration` falls due.
    pub fn next_due(&self, duration: Duration) -> Option<Instant> {
        self.intervals
            .lock()
            .iter()
            .find(|i| i.duration == duration)
            .map(|i| i.due)
    }

    /// Fires the earliest interval if it is due, otherwise reports when it will be.
    fn try_fire(&self) -> TheaterResult<Result<Effect, Instant>> {
        let mut intervals = self.intervals.lock();
        let now = Instant::now();

        let earliest = intervals
            .iter_mut()
            .min_by_key(|i| i.due)
            .ok_or_else(|| TheaterError::invalid_state("no intervals registered"))?;

        if earliest.due <= now {
            Ok(Ok(earliest.fire(now)))
        } else {
            Ok(Err(earliest.due))
        }
    }
}

#[async_trait]
impl Cause for MultiTimerCause {
    async fn check(&self, cancel: &CancellationToken) -> TheaterResult<Option<Effect>> {
        if !self.blocking {
            return Ok(self.try_fire()?.ok());
        }

        loop {
            // Reset before selecting: a registration racing with this check
            // sets the signal again and the wait below returns at once.
            self.signal.reset();
            let due = match self.try_fire()? {
                Ok(effect) => return Ok(Some(effect)),
                Err(due) => due,
            };

            let wait = due.saturating_duration_since(Instant::now());
            self.signal.wait(Some(wait), cancel).await?;
        }
    }

    fn describe(&self) -> String {
        let mode = if self.blocking { "blocking" } else { "polling" };
        format!("MultiTimer[{mode}]")
    }
}
