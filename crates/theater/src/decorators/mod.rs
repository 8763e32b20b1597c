//! Decorators wrap exactly one inner cause or behavior and augment its contract.
//!
//! Composition is plain nested ownership:
//! `RetryCause<DebugCause<PauseCause<Source>>>`.

pub mod debug;
pub mod pause;
pub mod required;
pub mod retry;
pub mod suppress;

pub use debug::{DebugBehavior, DebugCause};
pub use pause::{Notifier, PauseCause, PollCause};
pub use required::RequiredCause;
pub use retry::{Backoff, RetryBehavior, RetryCause};
pub use suppress::{SuppressBehavior, SuppressCause};
