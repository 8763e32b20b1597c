//! Effects: the payload a cause hands to a behavior.
//!
//! An [`Effect`] is immutable and cheap to clone. It is one of
//! - a single typed value,
//! - an ordered batch of sub-effects,
//! - a timer-fired marker.

use std::any::{type_name, Any};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Types that can be carried by a single-value effect.
pub trait EffectValue: Any + Send + Sync + fmt::Debug {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any + Send + Sync + fmt::Debug> EffectValue for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Clone)]
pub enum Effect {
    Value(ValueEffect),
    Batch(Arc<[Effect]>),
    TimerElapsed(TimerElapsed),
}

#[derive(Clone)]
pub struct ValueEffect {
    value: Arc<dyn EffectValue>,
    type_name: &'static str,
}

impl ValueEffect {
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn downcast_ref<T: EffectValue>(&self) -> Option<&T> {
        // Deref first: `Arc<dyn EffectValue>` is itself an `EffectValue`.
        (*self.value).as_any().downcast_ref::<T>()
    }
}

/// Fired by the multi-timer cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerElapsed {
    /// Nominal fire time (the interval's due time, not the wake-up time).
    pub elapsed: Instant,
    pub interval: Duration,
}

impl Effect {
    pub fn value<T: EffectValue>(value: T) -> Self {
        Self::Value(ValueEffect {
            value: Arc::new(value),
            type_name: short_type_name::<T>(),
        })
    }

    pub fn batch<I>(effects: I) -> Self
    where
        I: IntoIterator<Item = Effect>,
    {
        Self::Batch(effects.into_iter().collect())
    }

    pub fn timer(elapsed: Instant, interval: Duration) -> Self {
        Self::TimerElapsed(TimerElapsed { elapsed, interval })
    }

    /// The wrapped value, if this is a single-value effect of type `T`.
    pub fn downcast_ref<T: EffectValue>(&self) -> Option<&T> {
        match self {
            Self::Value(value) => value.downcast_ref::<T>(),
            _ => None,
        }
    }

    pub fn is<T: EffectValue>(&self) -> bool {
        self.downcast_ref::<T>().is_some()
    }

    pub fn as_batch(&self) -> Option<&[Effect]> {
        match self {
            Self::Batch(effects) => Some(effects),
            _ => None,
        }
    }

    pub fn as_timer(&self) -> Option<&TimerElapsed> {
        match self {
            Self::TimerElapsed(timer) => Some(timer),
            _ => None,
        }
    }
}

impl From<TimerElapsed> for Effect {
    fn from(timer: TimerElapsed) -> Self {
        Self::TimerElapsed(timer)
    }
}

impl From<Vec<Effect>> for Effect {
    fn from(effects: Vec<Effect>) -> Self {
        Self::Batch(effects.into())
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => write!(f, "Value<{}>({:?})", value.type_name, value.value),
            Self::Batch(effects) => write!(f, "Batch[{}]", effects.len()),
            Self::TimerElapsed(timer) => {
                write!(f, "TimerElapsed:{:?},{:?}", timer.elapsed, timer.interval)
            }
        }
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f
                .debug_tuple("Value")
                .field(&value.type_name)
                .field(&value.value)
                .finish(),
            Self::Batch(effects) => f.debug_list().entries(effects.iter()).finish(),
            Self::TimerElapsed(timer) => timer.fmt(f),
        }
    }
}

/// Last path segment without type arguments:
/// `core::option::Option<u32>` -> `Option`.
pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = type_name::<T>();
    let end = full.find('<').unwrap_or(full.len());
    let base = &full[..end];
    match base.rfind("::") {
        Some(pos) => &base[pos + 2..],
        None => base,
    }
}
