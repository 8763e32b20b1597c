use super::dedicated::{run_loop, Control};
use super::{describe_pair, Character, CharacterState};
use crate::behavior::Behavior;
use crate::cause::Cause;
use crate::config::CharacterConfig;
use crate::error::TheaterResult;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::oneshot;
use tracing::debug;

/// Runs its loop on a dedicated OS thread with a private single-threaded
/// tokio runtime. The thread is spawned on construction and lives until the
/// character is disposed.
pub struct ThreadCharacter {
    control: Arc<Control>,
    exited: Mutex<Option<oneshot::Receiver<()>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl ThreadCharacter {
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
        let name = describe_pair(&cause, &behavior);
        let control = Control::new(name, config.shutdown_timeout());
        let cause: Arc<dyn Cause> = Arc::new(cause);
        let behavior: Arc<dyn Behavior> = Arc::new(behavior);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let (exit_tx, exit_rx) = oneshot::channel::<()>();

        let loop_control = Arc::clone(&control);
        let thread = std::thread::Builder::new()
            .name("theater-character".to_string())
            .spawn(move || {
                runtime.block_on(run_loop(loop_control, cause, behavior));
                drop(runtime);
                // Dropping the sender tells dispose the thread is done.
                drop(exit_tx);
            })?;

        debug!(character = %control.name, "dedicated thread spawned");
        Ok(Self {
            control,
            exited: Mutex::new(Some(exit_rx)),
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Whether dispose gave up waiting for the thread.
    pub fn is_abandoned(&self) -> bool {
        self.control.is_abandoned()
    }
}

#[async_trait]
impl Character for ThreadCharacter {
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

        let exited = self.exited.lock().take();
        if let Some(exited) = exited {
            if tokio::time::timeout(self.control.grace, exited).await.is_err() {
                return Err(self.control.abandon());
            }
        }

        // The thread has finished its work; joining only reaps it.
        let thread = self.thread.lock().take();
        if let Some(thread) = thread {
            if thread.join().is_err() {
                debug!(character = %self.control.name, "dedicated thread panicked");
            }
        }

        debug!(character = %self.control.name, "character disposed");
        Ok(())
    }

    fn state(&self) -> CharacterState {
        self.control.state()
    }

    fn describe(&self) -> String {
        self.control.name.clone()
    }
}

impl Drop for ThreadCharacter {
    fn drop(&mut self) {
        // Never join here; the thread exits on its own once signalled.
        self.control.begin_dispose();
    }
}
