//! Error taxonomy shared by every cause, behavior and character.

use std::time::Duration;
use thiserror::Error;

pub type TheaterResult<T> = Result<T, TheaterError>;

#[derive(Debug, Error)]
pub enum TheaterError {
    /// Cooperative cancellation. Never retried, never suppressed.
    #[error("Operation cancelled")]
    Cancelled,

    /// Invalid construction or registration argument.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Operation called in a state that does not allow it.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("{0} is disposed")]
    Disposed(String),

    #[error("Behavior not found for effect {effect}")]
    DispatchNotFound { effect: String },

    #[error("Effect is not a batch: {effect}")]
    NotABatch { effect: String },

    /// The execution unit did not exit within the grace period and was abandoned.
    #[error("Execution unit did not stop within {grace:?} and was abandoned")]
    ShutdownTimeout { grace: Duration },

    #[error("Runtime error: {0}")]
    Runtime(#[from] std::io::Error),

    /// Failure raised by cause/behavior business logic.
    #[error(transparent)]
    Operation(#[from] anyhow::Error),
}

impl TheaterError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }
}
