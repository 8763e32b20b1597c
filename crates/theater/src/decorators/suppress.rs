use crate::behavior::Behavior;
use crate::cause::Cause;
use crate::effect::Effect;
use crate::error::TheaterResult;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::error;

/// Turns a failing check into "no effect". Cancellation still propagates.
#[derive(Debug)]
pub struct SuppressCause<C> {
    inner: C,
}

impl<C: Cause> SuppressCause<C> {
    pub fn new(inner: C) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<C: Cause> Cause for SuppressCause<C> {
    async fn check(&self, cancel: &CancellationToken) -> TheaterResult<Option<Effect>> {
        match self.inner.check(cancel).await {
            Err(err) if !err.is_cancelled() => {
                error!(cause = %self.inner.describe(), error = %err, "check failed, suppressed");
                Ok(None)
            }
            other => other,
        }
    }

    fn describe(&self) -> String {
        format!("Suppress>{}", self.inner.describe())
    }
}

/// Absorbs act failures after logging them. Cancellation still propagates.
#[derive(Debug)]
pub struct SuppressBehavior<B> {
    inner: B,
}

impl<B: Behavior> SuppressBehavior<B> {
    pub fn new(inner: B) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<B: Behavior> Behavior for SuppressBehavior<B> {
    async fn act(&self, effect: &Effect, cancel: &CancellationToken) -> TheaterResult<()> {
        match self.inner.act(effect, cancel).await {
            Err(err) if !err.is_cancelled() => {
                error!(
                    behavior = %self.inner.describe(),
                    effect = %effect,
                    error = %err,
                    "act failed, suppressed"
                );
                Ok(())
            }
            other => other,
        }
    }

    fn describe(&self) -> String {
        format!("Suppress>{}", self.inner.describe())
    }
}
