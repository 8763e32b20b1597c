use super::dedicated::{run_loop, Control};
use super::{describe_pair, Character, CharacterState};
use crate::behavior::Behavior;
use crate::cause::Cause;
use crate::config::CharacterConfig;
use crate::error::{TheaterError, TheaterResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Runs its loop as one long-lived tokio task on the current runtime.
pub struct TaskCharacter {
    control: Arc<Control>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl TaskCharacter {
    /// Must be called from within a tokio runtime.
    pub fn new<C, B>(cause: C, behavior: B) -> TheaterResult<Self>
    where
        C: Cause + 'static,
        B: Behavior + 'static,
    {
        Self::with_config(cause, behavior, CharacterConfig::default())
    }

    pub fn with_config<C, B>(cause: C, behavior: B, config: CharacterConfig) -> TheaterResult<Self>
    where
        C: Cause + 'static,
        B: Behavior + 'static,
    {
        let handle = Handle::try_current().map_err(|_| {
            TheaterError::invalid_state("a task character must be created inside a tokio runtime")
        })?;

        let control = Control::new(describe_pair(&cause, &behavior), config.shutdown_timeout());
        let task = handle.spawn(run_loop(
            Arc::clone(&control),
            Arc::new(cause),
            Arc::new(behavior),
        ));

        debug!(character = %control.name, "dedicated task spawned");
        Ok(Self {
            control,
            task: Mutex::new(Some(task)),
        })
    }

    pub fn is_abandoned(&self) -> bool {
        self.control.is_abandoned()
    }
}

#[async_trait]
impl Character for TaskCharacter {
    async fn start(&self) -> TheaterResult<()> {
        self.control.start()
    }

    async fn stop(&self) -> TheaterResult<()> {
        self.control.stop()
    }

    async fn dispose(&self) -> TheaterResult<()> {
        if !self.control.begin_dispose() {
            return Ok(());
        }

        let task = self.task.lock().take();
        let Some(mut task) = task else {
            return Ok(());
        };

        match tokio::time::timeout(self.control.grace, &mut task).await {
            Ok(Ok(())) => {
                debug!(character = %self.control.name, "character disposed");
                Ok(())
            }
            Ok(Err(join_error)) => {
                error!(character = %self.control.name, error = %join_error, "loop task panicked");
                Ok(())
            }
            // The task keeps running detached and exits once it observes cancellation.
            Err(_) => Err(self.control.abandon()),
        }
    }

    fn state(&self) -> CharacterState {
        self.control.state()
    }

    fn describe(&self) -> String {
        self.control.name.clone()
    }
}

impl Drop for TaskCharacter {
    fn drop(&mut self) {
        self.control.begin_dispose();
    }
}
