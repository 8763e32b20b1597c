//! The pull side of the engine.

use crate::decorators::{
    DebugCause, PauseCause, PollCause, RequiredCause, RetryCause, SuppressCause,
};
use crate::effect::{short_type_name, Effect, EffectValue};
use crate::error::TheaterResult;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Produces zero or one [`Effect`] per check.
///
/// `Ok(None)` means nothing is ready yet. Implementations that block must
/// observe `cancel` and return [`TheaterError::Cancelled`](crate::TheaterError::Cancelled)
/// when it fires. A cause is called repeatedly from a single loop and must be
/// internally synchronised if shared between characters.
#[async_trait]
pub trait Cause: Send + Sync {
    async fn check(&self, cancel: &CancellationToken) -> TheaterResult<Option<Effect>>;

    /// Name used in log lines.
    fn describe(&self) -> String {
        short_type_name::<Self>().to_string()
    }
}

#[async_trait]
impl<C: Cause + ?Sized> Cause for Arc<C> {
    async fn check(&self, cancel: &CancellationToken) -> TheaterResult<Option<Effect>> {
        (**self).check(cancel).await
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

#[async_trait]
impl<C: Cause + ?Sized> Cause for Box<C> {
    async fn check(&self, cancel: &CancellationToken) -> TheaterResult<Option<Effect>> {
        (**self).check(cancel).await
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Fluent decorator construction.
///
/// ```ignore
/// let cause = source
///     .with_pause(Duration::from_millis(500), true)?
///     .with_debug()
///     .with_retry(3);
/// ```
pub trait CauseExt: Cause + Sized {
    fn with_pause(self, period: Duration, execute_first_time: bool) -> TheaterResult<PauseCause<Self>> {
        PauseCause::new(self, period, execute_first_time)
    }

    fn with_poll(self, period: Duration, execute_first_time: bool) -> TheaterResult<PollCause<Self>> {
        PollCause::new(self, period, execute_first_time)
    }

    fn with_required(self) -> RequiredCause<Self> {
        RequiredCause::new(self)
    }

    fn with_retry(self, max_retries: u32) -> RetryCause<Self> {
        RetryCause::new(self, max_retries)
    }

    fn with_suppression(self) -> SuppressCause<Self> {
        SuppressCause::new(self)
    }

    fn with_debug(self) -> DebugCause<Self> {
        DebugCause::new(self)
    }

    fn wrap_with<W, F>(self, wrap: F) -> W
    where
        F: FnOnce(Self) -> W,
    {
        wrap(self)
    }

    fn boxed(self) -> Box<dyn Cause>
    where
        Self: 'static,
    {
        Box::new(self)
    }

    fn shared(self) -> Arc<dyn Cause>
    where
        Self: 'static,
    {
        Arc::new(self)
    }
}

impl<C: Cause + Sized> CauseExt for C {}

/// Closure-backed cause.
pub struct FnCause<F> {
    check: F,
    name: String,
}

impl<F> FnCause<F>
where
    F: Fn() -> TheaterResult<Option<Effect>> + Send + Sync,
{
    pub fn new(check: F) -> Self {
        Self {
            check,
            name: "FnCause".to_string(),
        }
    }

    pub fn named(name: impl Into<String>, check: F) -> Self {
        Self {
            check,
            name: name.into(),
        }
    }
}

#[async_trait]
impl<F> Cause for FnCause<F>
where
    F: Fn() -> TheaterResult<Option<Effect>> + Send + Sync,
{
    async fn check(&self, _cancel: &CancellationToken) -> TheaterResult<Option<Effect>> {
        (self.check)()
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

/// Current UTC time on every check.
#[derive(Debug, Default, Clone, Copy)]
pub struct NowCause;

#[async_trait]
impl Cause for NowCause {
    async fn check(&self, _cancel: &CancellationToken) -> TheaterResult<Option<Effect>> {
        Ok(Some(Effect::value(Utc::now())))
    }
}

/// Latest-value latch.
///
/// [`IndicatorCause::indicate`] stores a value; the next check hands it out once.
/// Values indicated between two checks overwrite each other.
#[derive(Debug)]
pub struct IndicatorCause<T> {
    latest: Mutex<Option<T>>,
}

impl<T> Default for IndicatorCause<T> {
    fn default() -> Self {
        Self {
            latest: Mutex::new(None),
        }
    }
}

impl<T: EffectValue> IndicatorCause<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn indicate(&self, value: T) {
        *self.latest.lock() = Some(value);
    }

    pub fn is_pending(&self) -> bool {
        self.latest.lock().is_some()
    }
}

#[async_trait]
impl<T: EffectValue> Cause for IndicatorCause<T> {
    async fn check(&self, _cancel: &CancellationToken) -> TheaterResult<Option<Effect>> {
        Ok(self.latest.lock().take().map(Effect::value))
    }

    fn describe(&self) -> String {
        format!("Indicator<{}>", short_type_name::<T>())
    }
}
