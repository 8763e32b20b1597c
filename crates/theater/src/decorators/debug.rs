//! Timing instrumentation. Observes the inner call without changing its result.

use crate::behavior::Behavior;
use crate::cause::Cause;
use crate::effect::Effect;
use crate::error::TheaterResult;
use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug)]
pub struct DebugCause<C> {
    inner: C,
    name: String,
}

impl<C: Cause> DebugCause<C> {
    /// Named with a fresh UUID.
    pub fn new(inner: C) -> Self {
        Self::named(inner, Uuid::new_v4().to_string())
    }

    pub fn named(inner: C, name: impl Into<String>) -> Self {
        Self {
            inner,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl<C: Cause> Cause for DebugCause<C> {
    async fn check(&self, cancel: &CancellationToken) -> TheaterResult<Option<Effect>> {
        debug!(name = %self.name, cause = %self.inner.describe(), "started checking");
        let started = Instant::now();

        let result = self.inner.check(cancel).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(effect) => {
                let effect = effect
                    .as_ref()
                    .map_or_else(|| "(null)".to_string(), ToString::to_string);
                debug!(name = %self.name, effect = %effect, duration_ms, "finished checking");
            }
            Err(err) => {
                debug!(name = %self.name, error = %err, duration_ms, "checking failed");
            }
        }

        result
    }

    fn describe(&self) -> String {
        format!("Debug({})>{}", self.name, self.inner.describe())
    }
}

#[derive(Debug)]
pub struct DebugBehavior<B> {
    inner: B,
    name: String,
}

impl<B: Behavior> DebugBehavior<B> {
    pub fn new(inner: B) -> Self {
        Self::named(inner, Uuid::new_v4().to_string())
    }

    pub fn named(inner: B, name: impl Into<String>) -> Self {
        Self {
            inner,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl<B: Behavior> Behavior for DebugBehavior<B> {
    async fn act(&self, effect: &Effect, cancel: &CancellationToken) -> TheaterResult<()> {
        debug!(name = %self.name, effect = %effect, "started acting");
        let started = Instant::now();

        let result = self.inner.act(effect, cancel).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(()) => debug!(name = %self.name, duration_ms, "finished acting"),
            Err(err) => debug!(name = %self.name, error = %err, duration_ms, "acting failed"),
        }

        result
    }

    fn describe(&self) -> String {
        format!("Debug({})>{}", self.name, self.inner.describe())
    }
}
