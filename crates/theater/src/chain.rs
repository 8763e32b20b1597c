//! Predicate-routed dispatch.
//!
//! A [`ChainBehavior`] holds an ordered, append-only list of links. Each link
//! pairs a predicate with a behavior factory; a matching link builds a fresh
//! behavior for every effect it handles.

use crate::behavior::Behavior;
use crate::effect::{short_type_name, Effect, EffectValue};
use crate::error::{TheaterError, TheaterResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// How many links handle one effect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Dispatch {
    /// Stop at the first matching link.
    #[default]
    FirstMatch,
    /// Run every matching link, in order.
    AllMatches,
}

/// Shape of the effect given to the chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChainInput {
    #[default]
    Single,
    /// A batch effect; each sub-effect is dispatched separately, in order.
    Batch,
}

type Predicate = dyn Fn(&Effect) -> bool + Send + Sync;
type Factory = dyn Fn() -> Box<dyn Behavior> + Send + Sync;

struct Link {
    name: String,
    predicate: Box<Predicate>,
    factory: Box<Factory>,
}

#[derive(Default)]
pub struct ChainBehavior {
    links: RwLock<Vec<Arc<Link>>>,
    dispatch: Dispatch,
    input: ChainInput,
}

impl ChainBehavior {
    pub fn new(dispatch: Dispatch, input: ChainInput) -> Self {
        Self {
            links: RwLock::new(Vec::new()),
            dispatch,
            input,
        }
    }

    pub fn add_link<P, F, B>(&self, predicate: P, factory: F)
    where
        P: Fn(&Effect) -> bool + Send + Sync + 'static,
        F: Fn() -> B + Send + Sync + 'static,
        B: Behavior + 'static,
    {
        self.push_link("link".to_string(), predicate, factory);
    }

    /// Link matching single-value effects whose payload is a `T`.
    pub fn add_type_link<T, F, B>(&self, factory: F)
    where
        T: EffectValue,
        F: Fn() -> B + Send + Sync + 'static,
        B: Behavior + 'static,
    {
        self.push_link(
            short_type_name::<T>().to_string(),
            |effect: &Effect| effect.is::<T>(),
            factory,
        );
    }

    pub fn link_count(&self) -> usize {
        self.links.read().len()
    }

    fn push_link<P, F, B>(&self, name: String, predicate: P, factory: F)
    where
        P: Fn(&Effect) -> bool + Send + Sync + 'static,
        F: Fn() -> B + Send + Sync + 'static,
        B: Behavior + 'static,
    {
        let link = Link {
            name,
            predicate: Box::new(predicate),
            factory: Box::new(move || Box::new(factory()) as Box<dyn Behavior>),
        };
        self.links.write().push(Arc::new(link));
    }

    async fn dispatch_one(
        &self,
        links: &[Arc<Link>],
        effect: &Effect,
        cancel: &CancellationToken,
    ) -> TheaterResult<()> {
        let mut matched = false;

        for link in links {
            if !(link.predicate)(effect) {
                continue;
            }

            let behavior = (link.factory)();
            trace!(
                link = %link.name,
                behavior = %behavior.describe(),
                effect = %effect,
                "dispatching"
            );
            behavior.act(effect, cancel).await?;
            matched = true;

            if self.dispatch == Dispatch::FirstMatch {
                break;
            }
        }

        if matched {
            Ok(())
        } else {
            Err(TheaterError::DispatchNotFound {
                effect: effect.to_string(),
            })
        }
    }
}

#[async_trait]
impl Behavior for ChainBehavior {
    async fn act(&self, effect: &Effect, cancel: &CancellationToken) -> TheaterResult<()> {
        let links = self.links.read().clone();
        if links.is_empty() {
            return Err(TheaterError::invalid_state("no chain links were added"));
        }

        match self.input {
            ChainInput::Single => self.dispatch_one(&links, effect, cancel).await,
            ChainInput::Batch => {
                let effects = effect.as_batch().ok_or_else(|| TheaterError::NotABatch {
                    effect: effect.to_string(),
                })?;
                for item in effects {
                    self.dispatch_one(&links, item, cancel).await?;
                }
                Ok(())
            }
        }
    }

    fn describe(&self) -> String {
        format!("Chain[{}]", self.link_count())
    }
}
