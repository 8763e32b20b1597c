//! Causes that own internal state: multiplexers, timers and queues.

pub mod bridge;
pub mod multi_timer;
pub mod queue;
pub mod revolver;

pub use bridge::{BridgeCause, PushMessage};
pub use multi_timer::MultiTimerCause;
pub use queue::{QueueCause, QueueMode};
pub use revolver::RevolverCause;
