use super::{describe_pair, drive, Character, CharacterState};
use crate::behavior::Behavior;
use crate::cause::Cause;
use crate::error::{TheaterError, TheaterResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Runs the loop on whoever calls [`Character::start`].
///
/// `start` returns once the character is stopped (`Ok`) or the loop fails
/// (`Err`). There is no background unit and no restart.
pub struct InlineCharacter {
    name: String,
    cause: Box<dyn Cause>,
    behavior: Box<dyn Behavior>,
    state: Mutex<CharacterState>,
    scope: CancellationToken,
}

impl InlineCharacter {
    pub fn new<C, B>(cause: C, behavior: B) -> Self
    where
        C: Cause + 'static,
        B: Behavior + 'static,
    {
        Self {
            name: describe_pair(&cause, &behavior),
            cause: Box::new(cause),
            behavior: Box::new(behavior),
            state: Mutex::new(CharacterState::Created),
            scope: CancellationToken::new(),
        }
    }

    fn set_state_unless_disposed(&self, next: CharacterState) {
        let mut state = self.state.lock();
        if *state != CharacterState::Disposed {
            *state = next;
        }
    }
}

#[async_trait]
impl Character for InlineCharacter {
    async fn start(&self) -> TheaterResult<()> {
        {
            let mut state = self.state.lock();
            match *state {
                CharacterState::Created => *state = CharacterState::Running,
                CharacterState::Disposed => return Err(TheaterError::Disposed(self.name.clone())),
                other => {
                    return Err(TheaterError::invalid_state(format!(
                        "{} is {other} and inline characters cannot be restarted",
                        self.name
                    )))
                }
            }
        }

        info!(character = %self.name, "inline character running");
        match drive(self.cause.as_ref(), self.behavior.as_ref(), &self.scope).await {
            Ok(()) => {
                self.set_state_unless_disposed(CharacterState::Stopped);
                info!(character = %self.name, "inline character stopped");
                Ok(())
            }
            Err(err) => {
                error!(character = %self.name, error = %err, "loop terminated by failure");
                self.set_state_unless_disposed(CharacterState::Faulted);
                Err(err)
            }
        }
    }

    async fn stop(&self) -> TheaterResult<()> {
        if *self.state.lock() == CharacterState::Disposed {
            return Err(TheaterError::Disposed(self.name.clone()));
        }
        self.scope.cancel();
        Ok(())
    }

    async fn dispose(&self) -> TheaterResult<()> {
        self.scope.cancel();
        *self.state.lock() = CharacterState::Disposed;
        Ok(())
    }

    fn state(&self) -> CharacterState {
        *self.state.lock()
    }

    fn describe(&self) -> String {
        self.name.clone()
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

    #[tokio::test]
    async fn start_blocks_until_stopped_and_cannot_restart() {
        let acts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&acts);
        let character = Arc::new(InlineCharacter::new(
            FnCause::new(|| Ok(Some(Effect::value(1u32)))),
            FnBehavior::new(move |_: &Effect| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        ));

        let runner = Arc::clone(&character);
        let handle = tokio::spawn(async move { runner.start().await });

        while acts.load(Ordering::SeqCst) < 5 {
            tokio::task::yield_now().await;
        }
        assert_eq!(character.state(), CharacterState::Running);

        character.stop().await.unwrap();
        handle.await.unwrap().unwrap();
        assert_eq!(character.state(), CharacterState::Stopped);

        assert!(matches!(
            character.start().await,
            Err(TheaterError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn failure_is_returned_to_the_caller() {
        let character = InlineCharacter::new(
            FnCause::new(|| Ok(Some(Effect::value(1u32)))),
            FnBehavior::new(|_: &Effect| Err(anyhow::anyhow!("disk full").into())),
        );

        let err = character.start().await.unwrap_err();
        assert_eq!(err.to_string(), "disk full");
        assert_eq!(character.state(), CharacterState::Faulted);
    }

    #[tokio::test]
    async fn disposed_character_rejects_everything() {
        let character = InlineCharacter::new(
            FnCause::new(|| Ok(None)),
            FnBehavior::new(|_: &Effect| Ok(())),
        );
        character.dispose().await.unwrap();

        assert_eq!(character.state(), CharacterState::Disposed);
        assert!(matches!(character.start().await, Err(TheaterError::Disposed(_))));
        assert!(matches!(character.stop().await, Err(TheaterError::Disposed(_))));
    }

    #[test]
    fn describe_joins_cause_and_behavior() {
        let character = InlineCharacter::new(
            FnCause::named("ticks", || Ok(None)),
            FnBehavior::named("sink", |_: &Effect| Ok(())),
        );
        assert_eq!(character.describe(), "ticks=>sink");
    }
}
