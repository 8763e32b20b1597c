//! Retry decorators.
//!
//! Any failure other than cancellation is retried until the attempt budget is
//! spent; the last failure is then returned unchanged. Cancellation always
//! propagates at once and never consumes an attempt.

use crate::behavior::Behavior;
use crate::cause::Cause;
use crate::effect::Effect;
use crate::error::{TheaterError, TheaterResult};
use crate::signal::sleep_or_cancel;
use async_trait::async_trait;
use rand::Rng;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Delay before the next attempt. `attempt` is 0 for the first retry.
#[derive(Clone, Default)]
pub enum Backoff {
    /// Retry immediately
    #[default]
    Immediate,

    /// Fixed delay between retries
    Fixed(Duration),

    /// initial + increment * attempt
    Linear {
        initial: Duration,
        increment: Duration,
    },

    /// initial * base^attempt, capped at `max`
    Exponential {
        initial: Duration,
        base: f64,
        max: Duration,
        jitter: bool,
    },

    /// Caller-supplied delay provider
    Custom(Arc<dyn Fn(u32) -> Duration + Send + Sync>),
}

impl Backoff {
    pub fn custom<F>(delay: F) -> Self
    where
        F: Fn(u32) -> Duration + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(delay))
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            Self::Immediate => Duration::ZERO,
            Self::Fixed(delay) => *delay,
            Self::Linear { initial, increment } => {
                initial.saturating_add(increment.saturating_mul(attempt))
            }
            Self::Exponential {
                initial,
                base,
                max,
                jitter,
            } => {
                let millis = initial.as_millis() as f64 * base.powf(attempt as f64);
                let delay = Duration::from_millis(millis as u64).min(*max);
                if *jitter {
                    with_jitter(delay)
                } else {
                    delay
                }
            }
            Self::Custom(delay) => delay(attempt),
        }
    }
}

impl fmt::Debug for Backoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Immediate => f.write_str("Immediate"),
            Self::Fixed(delay) => f.debug_tuple("Fixed").field(delay).finish(),
            Self::Linear { initial, increment } => f
                .debug_struct("Linear")
                .field("initial", initial)
                .field("increment", increment)
                .finish(),
            Self::Exponential {
                initial,
                base,
                max,
                jitter,
            } => f
                .debug_struct("Exponential")
                .field("initial", initial)
                .field("base", base)
                .field("max", max)
                .field("jitter", jitter)
                .finish(),
            Self::Custom(_) => f.write_str("Custom"),
        }
    }
}

/// ±25% random variation
fn with_jitter(delay: Duration) -> Duration {
    let factor = rand::thread_rng().gen_range(0.75..=1.25);
    Duration::from_millis((delay.as_millis() as f64 * factor) as u64)
}

async fn run_with_retry<T, F, Fut>(
    component: &str,
    max_retries: u32,
    backoff: &Backoff,
    cancel: &CancellationToken,
    mut operation: F,
) -> TheaterResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = TheaterResult<T>>,
{
    let mut retry = 0u32;

    loop {
        let err = match operation().await {
            Ok(value) => {
                if retry > 0 {
                    debug!(component = component, retries = retry, "succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if err.is_cancelled() => return Err(err),
            Err(err) => err,
        };

        if retry >= max_retries {
            warn!(
                component = component,
                attempts = retry + 1,
                error = %err,
                "giving up after exhausting retries"
            );
            return Err(err);
        }

        let delay = backoff.delay(retry);
        warn!(
            component = component,
            attempt = retry + 1,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "attempt failed, retrying"
        );

        if !delay.is_zero() {
            sleep_or_cancel(delay, cancel).await?;
        } else if cancel.is_cancelled() {
            return Err(TheaterError::Cancelled);
        }
        retry += 1;
    }
}

/// Retries a failing check up to `max_retries` more times.
///
/// `max_retries = 0` runs the original attempt only.
#[derive(Debug)]
pub struct RetryCause<C> {
    inner: C,
    max_retries: u32,
    backoff: Backoff,
}

impl<C: Cause> RetryCause<C> {
    pub fn new(inner: C, max_retries: u32) -> Self {
        Self {
            inner,
            max_retries,
            backoff: Backoff::Immediate,
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

#[async_trait]
impl<C: Cause> Cause for RetryCause<C> {
    async fn check(&self, cancel: &CancellationToken) -> TheaterResult<Option<Effect>> {
        let component = self.inner.describe();
        run_with_retry(&component, self.max_retries, &self.backoff, cancel, move || {
            self.inner.check(cancel)
        })
        .await
    }

    fn describe(&self) -> String {
        format!("Retry>{}", self.inner.describe())
    }
}

/// Runs a failing act up to `max_attempts` times in total.
#[derive(Debug)]
pub struct RetryBehavior<B> {
    inner: B,
    max_attempts: u32,
    backoff: Backoff,
}

impl<B: Behavior> RetryBehavior<B> {
    pub fn new(inner: B, max_attempts: u32) -> TheaterResult<Self> {
        if max_attempts == 0 {
            return Err(TheaterError::configuration(
                "max attempts must be at least 1",
            ));
        }

        Ok(Self {
            inner,
            max_attempts,
            backoff: Backoff::Immediate,
        })
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

#[async_trait]
impl<B: Behavior> Behavior for RetryBehavior<B> {
    async fn act(&self, effect: &Effect, cancel: &CancellationToken) -> TheaterResult<()> {
        let component = self.inner.describe();
        run_with_retry(&component, self.max_attempts - 1, &self.backoff, cancel, move || {
            self.inner.act(effect, cancel)
        })
        .await
    }

    fn describe(&self) -> String {
        format!("Retry>{}", self.inner.describe())
    }
}
