//! Composable execution engine
//!
//! Work is modelled as a loop of two halves: a [`Cause`] that is checked for
//! an [`Effect`] and a [`Behavior`] that acts on it. A [`Character`] owns one
//! pair and decides how the loop runs.
//!
//! # Architecture
//!
//! - **Cause / Behavior**: the pull and push halves, both async and cancellable
//! - **Decorators**: pause, poll backoff, required, retry, suppression, debug
//! - **Composites**: revolver, multi-timer, queue, bus bridge
//! - **ChainBehavior**: predicate dispatch to per-effect behavior instances
//! - **Characters**: inline, dedicated thread, dedicated task, bounded pool
//!
//! # Usage
//!
//! ```no_run
//! use std::time::Duration;
//! use theater::{CauseExt, Character, Effect, FnBehavior, NowCause, TaskCharacter};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cause = NowCause.with_pause(Duration::from_secs(1), true)?;
//!     let behavior = FnBehavior::new(|effect: &Effect| {
//!         println!("tick {effect}");
//!         Ok(())
//!     });
//!
//!     let character = TaskCharacter::new(cause, behavior)?;
//!     character.start().await?;
//!     tokio::time::sleep(Duration::from_secs(5)).await;
//!     character.dispose().await?;
//!     Ok(())
//! }
//! ```

pub mod behavior;
pub mod cause;
pub mod chain;
pub mod character;
pub mod composite;
pub mod config;
pub mod decorators;
pub mod effect;
pub mod error;
pub mod signal;

pub use behavior::{ActionBehavior, Behavior, BehaviorExt, FnBehavior, MismatchPolicy};
pub use cause::{Cause, CauseExt, FnCause, IndicatorCause, NowCause};
pub use chain::{ChainBehavior, ChainInput, Dispatch};
pub use character::{
    AdmissionPool, Character, CharacterState, InlineCharacter, PoolCharacter, Slot,
    TaskCharacter, ThreadCharacter,
};
pub use composite::{
    BridgeCause, MultiTimerCause, PushMessage, QueueCause, QueueMode, RevolverCause,
};
pub use config::{CharacterConfig, PoolConfig, TheaterConfig};
pub use decorators::{
    Backoff, DebugBehavior, DebugCause, Notifier, PauseCause, PollCause, RequiredCause,
    RetryBehavior, RetryCause, SuppressBehavior, SuppressCause,
};
pub use effect::{Effect, EffectValue, TimerElapsed, ValueEffect};
pub use error::{TheaterError, TheaterResult};
pub use signal::WakeSignal;

pub use common::Bus;
