//! Round-robin multiplexer over a dynamic set of causes.

use crate::cause::Cause;
use crate::effect::Effect;
use crate::error::TheaterResult;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Default)]
struct Cylinder {
    chambers: Vec<Arc<dyn Cause>>,
    /// Index of the next chamber to try.
    cursor: usize,
}

/// Fair multiplexer.
///
/// Each check scans the chambers starting at the cursor and returns the first
/// effect found. The cursor moves past every chamber tried, so the chamber
/// after a productive one goes first next time and no chamber is starved.
/// Chambers can be added while checks are running; a check always works on
/// the snapshot it took when it started.
#[derive(Default)]
pub struct RevolverCause {
    cylinder: Mutex<Cylinder>,
}

impl RevolverCause {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chambers<I>(chambers: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Cause>>,
    {
        let revolver = Self::new();
        for chamber in chambers {
            revolver.add_chamber(chamber);
        }
        revolver
    }

    /// Returns `false` if the same cause instance is already loaded.
    pub fn add_chamber(&self, chamber: Arc<dyn Cause>) -> bool {
        let mut cylinder = self.cylinder.lock();
        if cylinder
            .chambers
            .iter()
            .any(|existing| same_instance(existing, &chamber))
        {
            return false;
        }

        debug!(chamber = %chamber.describe(), "chamber added");
        cylinder.chambers.push(chamber);
        true
    }

    pub fn chamber_count(&self) -> usize {
        self.cylinder.lock().chambers.len()
    }

    fn snapshot(&self) -> (Vec<Arc<dyn Cause>>, usize) {
        let cylinder = self.cylinder.lock();
        (cylinder.chambers.clone(), cylinder.cursor)
    }

    fn advance_to(&self, position: usize) {
        self.cylinder.lock().cursor = position;
    }
}

fn same_instance(a: &Arc<dyn Cause>, b: &Arc<dyn Cause>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

#[async_trait]
impl Cause for RevolverCause {
    async fn check(&self, cancel: &CancellationToken) -> TheaterResult<Option<Effect>> {
        let (chambers, cursor) = self.snapshot();
        if chambers.is_empty() {
            return Ok(None);
        }

        let mut position = cursor % chambers.len();
        for _ in 0..chambers.len() {
            let chamber = &chambers[position];
            position = (position + 1) % chambers.len();

            let result = chamber.check(cancel).await;
            // The cursor moves even when the chamber fails.
            self.advance_to(position);

            if let Some(effect) = result? {
                return Ok(Some(effect));
            }
        }

        Ok(None)
    }

    fn describe(&self) -> String {
        format!("Revolver[{}]", self.chamber_count())
    }
}
