//! Characters own one cause/behavior pair and drive the check/act loop.
//!
//! | Variant             | Execution unit                         | Restartable |
//! |---------------------|----------------------------------------|-------------|
//! | [`InlineCharacter`] | the caller of `start`                  | no          |
//! | [`ThreadCharacter`] | one OS thread for the character's life | yes         |
//! | [`TaskCharacter`]   | one tokio task for the character's life| yes         |
//! | [`PoolCharacter`]   | supervisor task + bounded act tasks    | yes         |
//!
//! Lifecycle: `Created -> Running <-> Stopped -> Disposed`. A failure escaping
//! the cause or behavior moves the character to `Faulted`; only dispose is
//! accepted after that.

pub mod admission;
mod dedicated;
pub mod inline;
pub mod pool;
pub mod task;
pub mod thread;

pub use admission::{AdmissionPool, Slot};
pub use inline::InlineCharacter;
pub use pool::PoolCharacter;
pub use task::TaskCharacter;
pub use thread::ThreadCharacter;

use crate::behavior::Behavior;
use crate::cause::Cause;
use crate::error::{TheaterError, TheaterResult};
use async_trait::async_trait;
use std::fmt;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharacterState {
    Created,
    Running,
    Stopped,
    /// The loop ended on a failure and will not run again.
    Faulted,
    Disposed,
}

impl fmt::Display for CharacterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Faulted => "faulted",
            Self::Disposed => "disposed",
        };
        f.write_str(name)
    }
}

impl CharacterState {
    /// Whether `start` is allowed from this state.
    pub(crate) fn check_startable(self, name: &str) -> TheaterResult<()> {
        match self {
            Self::Created | Self::Stopped => Ok(()),
            Self::Running => Err(TheaterError::invalid_state(format!(
                "{name} is already running"
            ))),
            Self::Faulted => Err(TheaterError::invalid_state(format!(
                "{name} terminated after a failure"
            ))),
            Self::Disposed => Err(TheaterError::Disposed(name.to_string())),
        }
    }
}

#[async_trait]
pub trait Character: Send + Sync {
    /// Begin driving the loop. For [`InlineCharacter`] this call *is* the loop.
    async fn start(&self) -> TheaterResult<()>;

    /// Request cooperative cancellation of the running loop.
    async fn stop(&self) -> TheaterResult<()>;

    /// Stop for good and wait for the execution unit to exit.
    async fn dispose(&self) -> TheaterResult<()>;

    fn state(&self) -> CharacterState;

    fn describe(&self) -> String;
}

pub(crate) fn describe_pair(cause: &dyn Cause, behavior: &dyn Behavior) -> String {
    format!("{}=>{}", cause.describe(), behavior.describe())
}

/// Check then act until `cancel` fires.
///
/// `Ok(())` means the loop was cancelled; any other failure is returned as is.
/// Check and act never overlap, and every act receives the effect of the
/// check immediately before it.
pub(crate) async fn drive(
    cause: &dyn Cause,
    behavior: &dyn Behavior,
    cancel: &CancellationToken,
) -> TheaterResult<()> {
    loop {
        if cancel.is_cancelled() {
            return Ok(());
        }

        let effect = match cause.check(cancel).await {
            Ok(effect) => effect,
            Err(err) if err.is_cancelled() => return Ok(()),
            Err(err) => return Err(err),
        };

        let Some(effect) = effect else {
            tokio::task::yield_now().await;
            continue;
        };

        if cancel.is_cancelled() {
            return Ok(());
        }

        match behavior.act(&effect, cancel).await {
            Ok(()) => {}
            Err(err) if err.is_cancelled() => return Ok(()),
            Err(err) => return Err(err),
        }

        // Causes that are always ready never hit an await point on their own.
        tokio::task::yield_now().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::FnBehavior;
    use crate::cause::FnCause;
    use crate::effect::Effect;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn only_created_and_stopped_can_start() {
        assert!(CharacterState::Created.check_startable("c").is_ok());
        assert!(CharacterState::Stopped.check_startable("c").is_ok());
        assert!(matches!(
            CharacterState::Running.check_startable("c"),
            Err(TheaterError::InvalidState(_))
        ));
        assert!(matches!(
            CharacterState::Disposed.check_startable("c"),
            Err(TheaterError::Disposed(_))
        ));
    }

    #[tokio::test]
    async fn drive_returns_behavior_failure() {
        let cause = FnCause::new(|| Ok(Some(Effect::value(1u8))));
        let behavior = FnBehavior::new(|_: &Effect| Err(anyhow::anyhow!("sink closed").into()));

        let err = drive(&cause, &behavior, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "sink closed");
    }

    #[tokio::test]
    async fn drive_stops_when_cancelled_from_inside() {
        let token = CancellationToken::new();
        let acts = Arc::new(AtomicU32::new(0));

        let cause = FnCause::new(|| Ok(Some(Effect::value(()))));
        let (counter, canceller) = (Arc::clone(&acts), token.clone());
        let behavior = FnBehavior::new(move |_: &Effect| {
            if counter.fetch_add(1, Ordering::SeqCst) + 1 == 3 {
                canceller.cancel();
            }
            Ok(())
        });

        drive(&cause, &behavior, &token).await.unwrap();
        assert_eq!(acts.load(Ordering::SeqCst), 3);
    }
}
