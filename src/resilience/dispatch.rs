//! Dispatch executor.
//!
//! # Responsibilities
//! - Own one circuit breaker per target (created at startup or on first use)
//! - Run a unit of work behind the target's breaker
//! - Resolve every path (success, error, panic, rejection) to a [`CallOutcome`]
//! - Report each call to the registered observers
//!
//! # Design Decisions
//! - Never panics across its boundary; panics in the work are caught
//! - Async work runs on its own task, so a cancelled caller cannot skip the record
//! - Rejections never touch the backend and cost one lock acquisition

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use futures_util::FutureExt;

use crate::resilience::circuit_breaker::{
    Breaker, BreakerConfigError, BreakerOpen, BreakerSettings, BreakerSnapshot, Permit,
};
use crate::resilience::events::{CallObservation, Observers, OutcomeKind};

/// Result of one guarded call.
#[derive(Debug)]
pub enum CallOutcome<T, E> {
    /// The work ran and returned `Ok`.
    Success(T),
    /// The work ran and failed.
    Failure(CallFailure<E>),
    /// The breaker refused the call; the work never ran.
    Rejected(BreakerOpen),
}

impl<T, E> CallOutcome<T, E> {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            CallOutcome::Success(_) => OutcomeKind::Success,
            CallOutcome::Failure(_) => OutcomeKind::Failure,
            CallOutcome::Rejected(_) => OutcomeKind::Rejected,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CallOutcome::Success(_))
    }

    /// The payload, if the call succeeded.
    pub fn success(self) -> Option<T> {
        match self {
            CallOutcome::Success(value) => Some(value),
            _ => None,
        }
    }
}

/// Why a permitted call failed.
#[derive(Debug)]
pub enum CallFailure<E> {
    /// The work returned an error.
    Error(E),
    /// The work panicked; holds the panic message.
    Panicked(String),
    /// The task running the work was cancelled before it finished.
    Aborted,
}

impl<E: fmt::Display> fmt::Display for CallFailure<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallFailure::Error(err) => write!(f, "{}", err),
            CallFailure::Panicked(message) => write!(f, "work panicked: {}", message),
            CallFailure::Aborted => f.write_str("work was aborted"),
        }
    }
}

impl<E> std::error::Error for CallFailure<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CallFailure::Error(err) => Some(err),
            _ => None,
        }
    }
}

/// Runs work behind per-target circuit breakers.
#[derive(Debug)]
pub struct DispatchExecutor {
    breakers: DashMap<String, Arc<Breaker>>,
    defaults: BreakerSettings,
    observers: Observers,
}

impl DispatchExecutor {
    /// Create an executor whose lazily created breakers use `defaults`.
    pub fn new(defaults: BreakerSettings, observers: Observers) -> Result<Self, BreakerConfigError> {
        defaults.validate()?;
        Ok(Self {
            breakers: DashMap::new(),
            defaults,
            observers,
        })
    }

    /// Create the breaker for `target` with its own settings.
    ///
    /// If the target already has a breaker, that breaker is kept and returned.
    pub fn register(&self, target: &str, settings: BreakerSettings) -> Result<Arc<Breaker>, BreakerConfigError> {
        settings.validate()?;
        if let Some(existing) = self.breakers.get(target) {
            tracing::warn!(breaker = %target, "Breaker already registered, keeping existing settings");
            return Ok(Arc::clone(existing.value()));
        }
        Ok(self.get_or_create(target, settings))
    }

    /// The breaker guarding `target`, created with the default settings if needed.
    pub fn breaker(&self, target: &str) -> Arc<Breaker> {
        if let Some(existing) = self.breakers.get(target) {
            return Arc::clone(existing.value());
        }
        self.get_or_create(target, self.defaults.clone())
    }

    fn get_or_create(&self, target: &str, settings: BreakerSettings) -> Arc<Breaker> {
        let mut created = false;
        let breaker = self
            .breakers
            .entry(target.to_string())
            .or_insert_with(|| {
                created = true;
                Arc::new(Breaker::from_validated(
                    target.to_string(),
                    settings,
                    self.observers.clone(),
                ))
            })
            .clone();

        if created {
            tracing::debug!(breaker = %target, "Circuit breaker created");
            self.observers.breaker_created(target);
        }
        breaker
    }

    /// Snapshots of every breaker, sorted by name.
    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        let mut snapshots: Vec<_> = self.breakers.iter().map(|entry| entry.value().snapshot()).collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }

    /// Run synchronous work behind the breaker for `target`.
    pub fn call<T, E, F>(&self, target: &str, work: F) -> CallOutcome<T, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let permit = match self.admit(target) {
            Ok(permit) => permit,
            Err(rejected) => return CallOutcome::Rejected(rejected),
        };

        let started = Instant::now();
        let result = panic::catch_unwind(AssertUnwindSafe(work));
        settle(&self.observers, target, permit, started, result)
    }

    /// Run async work behind the breaker for `target`.
    ///
    /// The work is spawned onto its own task. If the caller is dropped while
    /// the work is in flight, the work still completes and its outcome is
    /// still recorded.
    pub async fn execute<T, E, Fut>(&self, target: &str, work: Fut) -> CallOutcome<T, E>
    where
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let permit = match self.admit(target) {
            Ok(permit) => permit,
            Err(rejected) => return CallOutcome::Rejected(rejected),
        };

        let observers = self.observers.clone();
        let owned_target = target.to_string();
        let task = tokio::spawn(async move {
            let started = Instant::now();
            let result = AssertUnwindSafe(work).catch_unwind().await;
            settle(&observers, &owned_target, permit, started, result)
        });

        match task.await {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!(breaker = %target, error = %err, "Dispatch task did not complete");
                CallOutcome::Failure(CallFailure::Aborted)
            }
        }
    }

    fn admit(&self, target: &str) -> Result<Permit, BreakerOpen> {
        let started = Instant::now();
        self.breaker(target).allow().map_err(|rejected| {
            tracing::debug!(breaker = %target, state = %rejected.state, "Call rejected by circuit breaker");
            self.observers.call_observed(&CallObservation {
                target: target.to_string(),
                outcome: OutcomeKind::Rejected,
                elapsed: started.elapsed(),
            });
            rejected
        })
    }
}

fn settle<T, E>(
    observers: &Observers,
    target: &str,
    permit: Permit,
    started: Instant,
    result: Result<Result<T, E>, Box<dyn Any + Send>>,
) -> CallOutcome<T, E> {
    let elapsed = started.elapsed();
    let outcome = match result {
        Ok(Ok(value)) => CallOutcome::Success(value),
        Ok(Err(err)) => CallOutcome::Failure(CallFailure::Error(err)),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::error!(breaker = %target, panic = %message, "Guarded work panicked");
            CallOutcome::Failure(CallFailure::Panicked(message))
        }
    };

    permit.record(outcome.is_success());
    observers.call_observed(&CallObservation {
        target: target.to_string(),
        outcome: outcome.kind(),
        elapsed,
    });
    outcome
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::resilience::circuit_breaker::BreakerState;
    use crate::resilience::events::testing::RecordingObserver;

    fn settings() -> BreakerSettings {
        BreakerSettings {
            failure_ratio_threshold: 0.6,
            min_requests_to_trip: 3,
            open_timeout: Duration::from_secs(30),
            rolling_interval: None,
            success_threshold: 1,
        }
    }

    fn executor() -> (Arc<RecordingObserver>, DispatchExecutor) {
        let (observer, observers) = RecordingObserver::shared();
        (observer, DispatchExecutor::new(settings(), observers).unwrap())
    }

    #[test]
    fn test_success_returns_payload() {
        let (observer, executor) = executor();
        let outcome: CallOutcome<&str, String> = executor.call("health", || Ok("ok"));

        assert_eq!(outcome.kind(), OutcomeKind::Success);
        assert_eq!(outcome.success(), Some("ok"));

        let calls = observer.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].target, "health");
        assert_eq!(calls[0].outcome, OutcomeKind::Success);
        assert_eq!(executor.breaker("health").snapshot().counts.successes, 1);
    }

    #[test]
    fn test_error_is_recorded_as_failure() {
        let (observer, executor) = executor();
        let outcome: CallOutcome<(), &str> = executor.call("health", || Err("backend down"));

        match outcome {
            CallOutcome::Failure(CallFailure::Error(err)) => assert_eq!(err, "backend down"),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(observer.calls()[0].outcome, OutcomeKind::Failure);
        assert_eq!(executor.breaker("health").snapshot().counts.failures, 1);
    }

    #[test]
    fn test_panic_is_caught_and_recorded() {
        let (observer, executor) = executor();
        let outcome: CallOutcome<(), String> = executor.call("health", || panic!("boom"));

        match outcome {
            CallOutcome::Failure(CallFailure::Panicked(message)) => assert_eq!(message, "boom"),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(observer.calls().len(), 1);
        assert_eq!(executor.breaker("health").snapshot().counts.failures, 1);
    }

    #[test]
    fn test_open_breaker_rejects_without_running_work() {
        let (observer, executor) = executor();
        for _ in 0..3 {
            let _: CallOutcome<(), &str> = executor.call("routes", || Err("fail"));
        }
        assert_eq!(executor.breaker("routes").state(), BreakerState::Open);

        let ran = AtomicU32::new(0);
        let outcome: CallOutcome<(), &str> = executor.call("routes", || {
            ran.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        match outcome {
            CallOutcome::Rejected(rejected) => {
                assert_eq!(rejected.target, "routes");
                assert_eq!(rejected.state, BreakerState::Open);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(ran.load(Ordering::SeqCst), 0);

        let calls = observer.calls();
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[3].outcome, OutcomeKind::Rejected);
        assert_eq!(observer.changes().len(), 1);
    }

    #[test]
    fn test_each_permitted_call_emits_one_observation() {
        let (observer, executor) = executor();
        let pattern = [true, false, true, true, false, true];
        for ok in pattern {
            let _: CallOutcome<(), ()> = executor.call("svc", || if ok { Ok(()) } else { Err(()) });
        }

        assert_eq!(observer.calls().len(), pattern.len());
        assert!(observer.changes().is_empty());
    }

    #[test]
    fn test_breakers_are_created_once_per_target() {
        let (observer, executor) = executor();
        let first = executor.breaker("svc");
        let second = executor.breaker("svc");
        let other = executor.breaker("other");

        assert!(Arc::ptr_eq(&first, &second));
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(observer.created(), vec!["svc".to_string(), "other".to_string()]);
    }

    #[test]
    fn test_register_uses_route_settings() {
        let (_, executor) = executor();
        let custom = BreakerSettings {
            min_requests_to_trip: 1,
            failure_ratio_threshold: 1.0,
            ..settings()
        };
        executor.register("fragile", custom.clone()).unwrap();
        assert_eq!(executor.breaker("fragile").settings(), &custom);

        let _: CallOutcome<(), ()> = executor.call("fragile", || Err(()));
        assert_eq!(executor.breaker("fragile").state(), BreakerState::Open);
    }

    #[test]
    fn test_register_rejects_invalid_settings() {
        let (_, executor) = executor();
        let invalid = BreakerSettings {
            min_requests_to_trip: 0,
            ..settings()
        };
        assert_eq!(
            executor.register("svc", invalid).unwrap_err(),
            BreakerConfigError::MinRequests
        );
        assert!(executor.snapshots().is_empty());
    }

    #[test]
    fn test_snapshots_are_sorted_by_name() {
        let (_, executor) = executor();
        executor.breaker("zeta");
        executor.breaker("alpha");

        let names: Vec<_> = executor.snapshots().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[tokio::test]
    async fn test_execute_runs_async_work() {
        let (observer, executor) = executor();
        let outcome: CallOutcome<u32, String> = executor
            .execute("backend", async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok(7)
            })
            .await;

        assert_eq!(outcome.success(), Some(7));
        let calls = observer.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].elapsed >= Duration::from_millis(5));
    }

    #[tokio::test]
    async fn test_execute_catches_panics() {
        let (_, executor) = executor();
        let outcome: CallOutcome<(), String> = executor
            .execute("backend", async {
                let explode = true;
                if explode {
                    panic!("async boom");
                }
                Ok(())
            })
            .await;

        assert!(matches!(outcome, CallOutcome::Failure(CallFailure::Panicked(_))));
        assert_eq!(executor.breaker("backend").snapshot().counts.failures, 1);
    }

    #[tokio::test]
    async fn test_cancelled_caller_still_records_outcome() {
        let (observer, executor) = executor();
        let executor = Arc::new(executor);
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let caller = {
            let executor = executor.clone();
            tokio::spawn(async move {
                let _: CallOutcome<(), String> = executor
                    .execute("backend", async move {
                        let _ = release_rx.await;
                        Err("late failure".to_string())
                    })
                    .await;
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        caller.abort();
        let _ = caller.await;
        assert!(observer.calls().is_empty());

        release_tx.send(()).unwrap();
        for _ in 0..100 {
            if !observer.calls().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let calls = observer.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].outcome, OutcomeKind::Failure);
        assert_eq!(executor.breaker("backend").snapshot().counts.failures, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_calls_keep_counts_consistent() {
        let executor = Arc::new(
            DispatchExecutor::new(
                BreakerSettings {
                    min_requests_to_trip: 1_000,
                    ..settings()
                },
                Observers::default(),
            )
            .unwrap(),
        );

        let tasks: Vec<_> = (0..200u32)
            .map(|i| {
                let executor = executor.clone();
                tokio::spawn(async move {
                    let _: CallOutcome<(), ()> = executor
                        .execute("backend", async move { if i % 4 == 0 { Err(()) } else { Ok(()) } })
                        .await;
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let counts = executor.breaker("backend").snapshot().counts;
        assert_eq!(counts.requests, 200);
        assert_eq!(counts.failures, 50);
        assert_eq!(counts.successes, 150);
    }
}
