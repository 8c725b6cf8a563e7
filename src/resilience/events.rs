//! Breaker and dispatch events.
//!
//! # Responsibilities
//! - Define the events emitted by breakers and the dispatch executor
//! - Define the observer seam consumed by metrics (and tests)
//! - Fan a single event out to every registered observer
//!
//! # Design Decisions
//! - Observers are called synchronously on the request path, so they must be cheap
//! - Breakers never hold their lock while notifying observers

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::resilience::circuit_breaker::BreakerState;

/// A breaker moved from one state to another.
///
/// Observers run outside the breaker lock, so changes of one breaker can
/// arrive out of order; `generation` increases with every transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub name: String,
    pub from: BreakerState,
    pub to: BreakerState,
    pub generation: u64,
}

/// How a dispatched call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeKind {
    Success,
    Failure,
    Rejected,
}

impl OutcomeKind {
    /// Label value used in metrics and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            OutcomeKind::Success => "success",
            OutcomeKind::Failure => "failure",
            OutcomeKind::Rejected => "rejected",
        }
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One call observed by the dispatch executor.
#[derive(Debug, Clone, PartialEq)]
pub struct CallObservation {
    pub target: String,
    pub outcome: OutcomeKind,
    pub elapsed: Duration,
}

/// Receives breaker and dispatch events.
///
/// All methods default to no-ops so implementors only pick what they need.
pub trait BreakerObserver: Send + Sync {
    /// A breaker was created for `name` (it starts Closed).
    fn breaker_created(&self, _name: &str) {}

    /// A breaker changed state.
    fn state_changed(&self, _change: &StateChange) {}

    /// A call was permitted and resolved, or rejected.
    fn call_observed(&self, _call: &CallObservation) {}
}

/// Immutable, cheaply clonable list of observers.
#[derive(Clone)]
pub struct Observers {
    inner: Arc<[Arc<dyn BreakerObserver>]>,
}

impl Observers {
    pub fn new(observers: Vec<Arc<dyn BreakerObserver>>) -> Self {
        Self {
            inner: observers.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub(crate) fn breaker_created(&self, name: &str) {
        for observer in self.inner.iter() {
            observer.breaker_created(name);
        }
    }

    pub(crate) fn state_changed(&self, change: &StateChange) {
        for observer in self.inner.iter() {
            observer.state_changed(change);
        }
    }

    pub(crate) fn call_observed(&self, call: &CallObservation) {
        for observer in self.inner.iter() {
            observer.call_observed(call);
        }
    }
}

impl Default for Observers {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl fmt::Debug for Observers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers")
            .field("count", &self.inner.len())
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingObserver;
    use super::*;

    #[test]
    fn test_fan_out_reaches_every_observer() {
        let first = Arc::new(RecordingObserver::default());
        let second = Arc::new(RecordingObserver::default());
        let observers = Observers::new(vec![
            first.clone() as Arc<dyn BreakerObserver>,
            second.clone() as Arc<dyn BreakerObserver>,
        ]);
        assert_eq!(observers.len(), 2);

        observers.state_changed(&StateChange {
            name: "svc".into(),
            from: BreakerState::Closed,
            to: BreakerState::Open,
            generation: 1,
        });

        assert_eq!(first.changes().len(), 1);
        assert_eq!(second.changes().len(), 1);
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(OutcomeKind::Success.as_str(), "success");
        assert_eq!(OutcomeKind::Failure.to_string(), "failure");
        assert_eq!(OutcomeKind::Rejected.as_str(), "rejected");
    }
}
