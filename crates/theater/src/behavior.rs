//! The push side of the engine.

use crate::decorators::{DebugBehavior, RetryBehavior, SuppressBehavior};
use crate::effect::{short_type_name, Effect, EffectValue};
use crate::error::{TheaterError, TheaterResult};
use async_trait::async_trait;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Consumes one [`Effect`] per call. Side effects only.
#[async_trait]
pub trait Behavior: Send + Sync {
    async fn act(&self, effect: &Effect, cancel: &CancellationToken) -> TheaterResult<()>;

    fn describe(&self) -> String {
        short_type_name::<Self>().to_string()
    }
}

#[async_trait]
impl<B: Behavior + ?Sized> Behavior for Arc<B> {
    async fn act(&self, effect: &Effect, cancel: &CancellationToken) -> TheaterResult<()> {
        (**self).act(effect, cancel).await
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

#[async_trait]
impl<B: Behavior + ?Sized> Behavior for Box<B> {
    async fn act(&self, effect: &Effect, cancel: &CancellationToken) -> TheaterResult<()> {
        (**self).act(effect, cancel).await
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

pub trait BehaviorExt: Behavior + Sized {
    fn with_retry(self, max_attempts: u32) -> TheaterResult<RetryBehavior<Self>> {
        RetryBehavior::new(self, max_attempts)
    }

    fn with_suppression(self) -> SuppressBehavior<Self> {
        SuppressBehavior::new(self)
    }

    fn with_debug(self) -> DebugBehavior<Self> {
        DebugBehavior::new(self)
    }

    fn wrap_with<W, F>(self, wrap: F) -> W
    where
        F: FnOnce(Self) -> W,
    {
        wrap(self)
    }

    fn boxed(self) -> Box<dyn Behavior>
    where
        Self: 'static,
    {
        Box::new(self)
    }

    fn shared(self) -> Arc<dyn Behavior>
    where
        Self: 'static,
    {
        Arc::new(self)
    }
}

impl<B: Behavior + Sized> BehaviorExt for B {}

/// Closure-backed behavior.
pub struct FnBehavior<F> {
    act: F,
    name: String,
}

impl<F> FnBehavior<F>
where
    F: Fn(&Effect) -> TheaterResult<()> + Send + Sync,
{
    pub fn new(act: F) -> Self {
        Self {
            act,
            name: "FnBehavior".to_string(),
        }
    }

    pub fn named(name: impl Into<String>, act: F) -> Self {
        Self {
            act,
            name: name.into(),
        }
    }
}

#[async_trait]
impl<F> Behavior for FnBehavior<F>
where
    F: Fn(&Effect) -> TheaterResult<()> + Send + Sync,
{
    async fn act(&self, effect: &Effect, _cancel: &CancellationToken) -> TheaterResult<()> {
        (self.act)(effect)
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

/// What a typed behavior does with an effect of the wrong shape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MismatchPolicy {
    #[default]
    Fail,
    Skip,
}

/// Runs a closure on the payload of single-value effects of type `T`.
pub struct ActionBehavior<T, F> {
    action: F,
    on_mismatch: MismatchPolicy,
    _payload: PhantomData<fn(&T)>,
}

impl<T, F> ActionBehavior<T, F>
where
    T: EffectValue,
    F: Fn(&T) -> anyhow::Result<()> + Send + Sync,
{
    pub fn new(action: F) -> Self {
        Self {
            action,
            on_mismatch: MismatchPolicy::Fail,
            _payload: PhantomData,
        }
    }

    pub fn on_mismatch(mut self, policy: MismatchPolicy) -> Self {
        self.on_mismatch = policy;
        self
    }
}

#[async_trait]
impl<T, F> Behavior for ActionBehavior<T, F>
where
    T: EffectValue,
    F: Fn(&T) -> anyhow::Result<()> + Send + Sync,
{
    async fn act(&self, effect: &Effect, _cancel: &CancellationToken) -> TheaterResult<()> {
        match effect.downcast_ref::<T>() {
            Some(value) => (self.action)(value).map_err(TheaterError::from),
            None => match self.on_mismatch {
                MismatchPolicy::Skip => Ok(()),
                MismatchPolicy::Fail => Err(TheaterError::invalid_state(format!(
                    "can't cast effect {effect} to {}",
                    short_type_name::<T>()
                ))),
            },
        }
    }

    fn describe(&self) -> String {
        format!("Action<{}>", short_type_name::<T>())
    }
}
