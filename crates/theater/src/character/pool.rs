//! Bounded-concurrency character.
//!
//! One supervisor task checks the cause serially and hands every effect to a
//! separate act task, with at most `max_concurrency` act tasks running at
//! once. Effects are admitted in the order they were produced; their
//! completion order is unspecified.

use super::admission::AdmissionPool;
use super::{describe_pair, Character, CharacterState};
use crate::behavior::Behavior;
use crate::cause::Cause;
use crate::config::PoolConfig;
use crate::error::{TheaterError, TheaterResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

struct Run {
    state: CharacterState,
    scope: CancellationToken,
    supervisor: Option<JoinHandle<()>>,
}

struct Shared {
    name: String,
    cause: Arc<dyn Cause>,
    behavior: Arc<dyn Behavior>,
    admission: Arc<AdmissionPool>,
    acts: TaskTracker,
    run: Mutex<Run>,
}

pub struct PoolCharacter {
    shared: Arc<Shared>,
    grace: Duration,
    abandoned: AtomicBool,
}

impl PoolCharacter {
    pub fn new<C, B>(cause: C, behavior: B, config: PoolConfig) -> TheaterResult<Self>
    where
        C: Cause + 'static,
        B: Behavior + 'static,
    {
        config.validate()?;
        let admission = AdmissionPool::new(config.max_concurrency, config.poll_interval())?;

        Ok(Self {
            shared: Arc::new(Shared {
                name: describe_pair(&cause, &behavior),
                cause: Arc::new(cause),
                behavior: Arc::new(behavior),
                admission,
                acts: TaskTracker::new(),
                run: Mutex::new(Run {
                    state: CharacterState::Created,
                    scope: CancellationToken::new(),
                    supervisor: None,
                }),
            }),
            grace: config.character.shutdown_timeout(),
            abandoned: AtomicBool::new(false),
        })
    }

    pub fn max_concurrency(&self) -> usize {
        self.shared.admission.max()
    }

    /// Act tasks currently holding a slot.
    pub fn active(&self) -> usize {
        self.shared.admission.active()
    }

    /// Whether dispose gave up on acts or a supervisor still running.
    pub fn is_abandoned(&self) -> bool {
        self.abandoned.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Character for PoolCharacter {
    async fn start(&self) -> TheaterResult<()> {
        let handle = Handle::try_current().map_err(|_| {
            TheaterError::invalid_state("a pool character must be started inside a tokio runtime")
        })?;

        let mut run = self.shared.run.lock();
        run.state.check_startable(&self.shared.name)?;

        let scope = CancellationToken::new();
        run.scope = scope.clone();
        run.state = CharacterState::Running;

        // A previous supervisor may still be unwinding; the new one waits for it
        // so checks never overlap.
        let previous = run.supervisor.take();
        let shared = Arc::clone(&self.shared);
        run.supervisor = Some(handle.spawn(async move {
            if let Some(previous) = previous {
                let _ = previous.await;
            }
            supervise(shared, scope).await;
        }));

        info!(character = %self.shared.name, "pool character started");
        Ok(())
    }

    async fn stop(&self) -> TheaterResult<()> {
        let mut run = self.shared.run.lock();
        match run.state {
            CharacterState::Disposed => Err(TheaterError::Disposed(self.shared.name.clone())),
            CharacterState::Running => {
                run.scope.cancel();
                run.state = CharacterState::Stopped;
                info!(character = %self.shared.name, "pool character stopped");
                Ok(())
            }
            _ => Ok(()),
        }
    }

    async fn dispose(&self) -> TheaterResult<()> {
        let supervisor = {
            let mut run = self.shared.run.lock();
            if run.state == CharacterState::Disposed {
                return Ok(());
            }
            run.scope.cancel();
            run.state = CharacterState::Disposed;
            run.supervisor.take()
        };

        let shared = Arc::clone(&self.shared);
        let drained = tokio::time::timeout(self.grace, async move {
            if let Some(supervisor) = supervisor {
                let _ = supervisor.await;
            }
            shared.acts.close();
            shared.acts.wait().await;
        })
        .await;

        match drained {
            Ok(()) => {
                debug!(character = %self.shared.name, "pool character disposed");
                Ok(())
            }
            Err(_) => {
                self.abandoned.store(true, Ordering::Release);
                warn!(
                    character = %self.shared.name,
                    grace_ms = self.grace.as_millis() as u64,
                    in_flight = self.shared.acts.len(),
                    "pool did not drain in time and was abandoned"
                );
                Err(TheaterError::ShutdownTimeout { grace: self.grace })
            }
        }
    }

    fn state(&self) -> CharacterState {
        self.shared.run.lock().state
    }

    fn describe(&self) -> String {
        self.shared.name.clone()
    }
}

impl Drop for PoolCharacter {
    fn drop(&mut self) {
        self.shared.run.lock().scope.cancel();
    }
}

async fn supervise(shared: Arc<Shared>, scope: CancellationToken) {
    debug!(character = %shared.name, "supervisor running");

    loop {
        if scope.is_cancelled() {
            break;
        }

        // Don't evaluate the cause while every slot is taken.
        if !shared.admission.has_capacity() {
            if shared.admission.wait_for_capacity(&scope).await.is_err() {
                break;
            }
            continue;
        }

        let effect = match shared.cause.check(&scope).await {
            Ok(Some(effect)) => effect,
            Ok(None) => {
                tokio::task::yield_now().await;
                continue;
            }
            Err(err) if err.is_cancelled() => break,
            Err(err) => {
                error!(character = %shared.name, error = %err, "check failed, supervisor terminated");
                let mut run = shared.run.lock();
                if run.state == CharacterState::Running {
                    run.state = CharacterState::Faulted;
                }
                break;
            }
        };

        let slot = match shared.admission.acquire(&scope).await {
            Ok(slot) => slot,
            Err(_) => break,
        };
        if scope.is_cancelled() {
            break;
        }

        let behavior = Arc::clone(&shared.behavior);
        let name = shared.name.clone();
        let token = scope.clone();
        shared.acts.spawn(async move {
            let _slot = slot;
            match behavior.act(&effect, &token).await {
                Err(err) if !err.is_cancelled() => {
                    error!(character = %name, effect = %effect, error = %err, "act failed");
                }
                _ => {}
            }
        });
        tokio::task::yield_now().await;
    }

    debug!(character = %shared.name, "supervisor exited");
}
