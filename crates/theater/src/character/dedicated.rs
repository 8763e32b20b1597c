//! Control block and run loop shared by the thread and task characters.
//!
//! The execution unit lives as long as the character. `start` and `stop` only
//! open and close a gate and cancel the current run scope; the loop waits on
//! the gate, runs until its scope is cancelled, swaps in a fresh scope and
//! goes back to waiting.

use super::{drive, CharacterState};
use crate::behavior::Behavior;
use crate::cause::Cause;
use crate::error::{TheaterError, TheaterResult};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub(crate) struct Control {
    pub(crate) name: String,
    /// `true` while the character is started.
    gate: watch::Sender<bool>,
    scope: Mutex<CancellationToken>,
    disposing: CancellationToken,
    state: Mutex<CharacterState>,
    abandoned: AtomicBool,
    pub(crate) grace: Duration,
}

impl Control {
    pub(crate) fn new(name: String, grace: Duration) -> Arc<Self> {
        let (gate, _) = watch::channel(false);
        Arc::new(Self {
            name,
            gate,
            scope: Mutex::new(CancellationToken::new()),
            disposing: CancellationToken::new(),
            state: Mutex::new(CharacterState::Created),
            abandoned: AtomicBool::new(false),
            grace,
        })
    }

    pub(crate) fn state(&self) -> CharacterState {
        *self.state.lock()
    }

    pub(crate) fn is_abandoned(&self) -> bool {
        self.abandoned.load(Ordering::Acquire)
    }

    pub(crate) fn start(&self) -> TheaterResult<()> {
        let mut state = self.state.lock();
        state.check_startable(&self.name)?;
        *state = CharacterState::Running;
        self.gate.send_replace(true);
        info!(character = %self.name, "character started");
        Ok(())
    }

    pub(crate) fn stop(&self) -> TheaterResult<()> {
        let mut state = self.state.lock();
        match *state {
            CharacterState::Disposed => Err(TheaterError::Disposed(self.name.clone())),
            CharacterState::Running => {
                self.gate.send_replace(false);
                self.scope.lock().cancel();
                *state = CharacterState::Stopped;
                info!(character = %self.name, "character stopped");
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Close the gate for good and signal the loop to exit.
    /// Returns `false` if the character was already disposed.
    pub(crate) fn begin_dispose(&self) -> bool {
        let mut state = self.state.lock();
        if *state == CharacterState::Disposed {
            return false;
        }
        self.gate.send_replace(false);
        self.scope.lock().cancel();
        self.disposing.cancel();
        *state = CharacterState::Disposed;
        true
    }

    pub(crate) fn abandon(&self) -> TheaterError {
        self.abandoned.store(true, Ordering::Release);
        warn!(
            character = %self.name,
            grace_ms = self.grace.as_millis() as u64,
            "execution unit did not exit in time and was abandoned"
        );
        TheaterError::ShutdownTimeout { grace: self.grace }
    }

    fn fault(&self) {
        let mut state = self.state.lock();
        if *state != CharacterState::Disposed {
            *state = CharacterState::Faulted;
        }
        self.gate.send_replace(false);
    }

    /// Token for the next run, replacing the previous one if it was cancelled.
    fn next_scope(&self) -> CancellationToken {
        let mut scope = self.scope.lock();
        if scope.is_cancelled() {
            *scope = CancellationToken::new();
        }
        scope.clone()
    }
}

/// Lives for the whole life of the character.
pub(crate) async fn run_loop(
    control: Arc<Control>,
    cause: Arc<dyn Cause>,
    behavior: Arc<dyn Behavior>,
) {
    let mut gate = control.gate.subscribe();

    loop {
        let opened = tokio::select! {
            biased;
            _ = control.disposing.cancelled() => false,
            opened = gate.wait_for(|open| *open) => opened.is_ok(),
        };
        if !opened {
            break;
        }

        let token = control.next_scope();
        // A stop that raced with the gate opening leaves it closed again.
        let still_open = *gate.borrow();
        if !still_open {
            continue;
        }

        debug!(character = %control.name, "loop running");
        match drive(cause.as_ref(), behavior.as_ref(), &token).await {
            Ok(()) => debug!(character = %control.name, "loop paused"),
            Err(err) => {
                error!(
                    character = %control.name,
                    error = %err,
                    "loop terminated by failure"
                );
                control.fault();
                break;
            }
        }
    }

    debug!(character = %control.name, "execution unit exiting");
}
