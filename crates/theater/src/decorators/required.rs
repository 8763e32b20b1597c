use crate::cause::Cause;
use crate::effect::Effect;
use crate::error::{TheaterError, TheaterResult};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Keeps checking the inner cause until it produces an effect.
///
/// Never returns `Ok(None)`. Put a pacing decorator underneath, otherwise an
/// idle inner cause turns this into a busy loop.
#[derive(Debug)]
pub struct RequiredCause<C> {
    inner: C,
}

impl<C: Cause> RequiredCause<C> {
    pub fn new(inner: C) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<C: Cause> Cause for RequiredCause<C> {
    async fn check(&self, cancel: &CancellationToken) -> TheaterResult<Option<Effect>> {
        loop {
            if cancel.is_cancelled() {
                return Err(TheaterError::Cancelled);
            }
            if let Some(effect) = self.inner.check(cancel).await? {
                return Ok(Some(effect));
            }
            // Inner causes that never await must not starve the executor.
            tokio::task::yield_now().await;
        }
    }

    fn describe(&self) -> String {
        format!("Required>{}", self.inner.describe())
    }
}
