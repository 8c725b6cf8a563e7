//! Circuit breaker for backend protection.
//!
//! # States
//! - Closed: normal operation, calls pass through and are counted
//! - Open: backend assumed down, calls fail fast
//! - Half-Open: a single probe call tests whether the backend recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: requests >= min_requests_to_trip AND failures/requests >= threshold
//! Open → Half-Open: first allow() once open_timeout has elapsed
//! Half-Open → Closed: success_threshold consecutive probe successes
//! Half-Open → Open: any probe failure
//! ```
//!
//! # Design Decisions
//! - Per-target circuit breaker (not global), owned by the dispatch executor
//! - Fail fast in Open state (no waiting for timeout)
//! - Single probe in Half-Open (prevents hammering recovering backend)
//! - Transitions only happen on the call path; there is no timer task
//! - Counts belong to a generation; results from an older generation are dropped

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::resilience::events::{Observers, StateChange};

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    HalfOpen,
    Open,
}

impl BreakerState {
    /// Gauge encoding: 0=closed, 1=half-open, 2=open.
    pub fn ordinal(self) -> u8 {
        match self {
            BreakerState::Closed => 0,
            BreakerState::HalfOpen => 1,
            BreakerState::Open => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::HalfOpen => "half-open",
            BreakerState::Open => "open",
        }
    }
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Call statistics for the current generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    pub requests: u32,
    pub successes: u32,
    pub failures: u32,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
}

impl Counts {
    fn on_success(&mut self) {
        self.requests = self.requests.saturating_add(1);
        self.successes = self.successes.saturating_add(1);
        self.consecutive_successes = self.consecutive_successes.saturating_add(1);
        self.consecutive_failures = 0;
    }

    fn on_failure(&mut self) {
        self.requests = self.requests.saturating_add(1);
        self.failures = self.failures.saturating_add(1);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.consecutive_successes = 0;
    }

    /// Failures over requests, or `None` when nothing has been recorded.
    pub fn failure_ratio(&self) -> Option<f64> {
        (self.requests > 0).then(|| f64::from(self.failures) / f64::from(self.requests))
    }
}

/// Invalid breaker settings. Fatal at startup.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BreakerConfigError {
    #[error("failure ratio threshold must be within (0, 1], got {0}")]
    FailureRatio(f64),

    #[error("min requests to trip must be at least 1")]
    MinRequests,

    #[error("open timeout must be greater than zero")]
    OpenTimeout,

    #[error("rolling interval must be greater than zero when set")]
    RollingInterval,

    #[error("success threshold must be at least 1")]
    SuccessThreshold,
}

/// Tuning for a single breaker.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakerSettings {
    /// Trip when `failures / requests` reaches this value.
    pub failure_ratio_threshold: f64,
    /// Never trip before this many calls in the current generation.
    pub min_requests_to_trip: u32,
    /// Time spent Open before a probe is allowed.
    pub open_timeout: Duration,
    /// Closed-state counting window. `None` keeps counting until a transition.
    pub rolling_interval: Option<Duration>,
    /// Consecutive probe successes needed to close from Half-Open.
    pub success_threshold: u32,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_ratio_threshold: 0.8,
            min_requests_to_trip: 5,
            open_timeout: Duration::from_secs(30),
            rolling_interval: Some(Duration::from_secs(60)),
            success_threshold: 1,
        }
    }
}

impl BreakerSettings {
    pub fn validate(&self) -> Result<(), BreakerConfigError> {
        let ratio = self.failure_ratio_threshold;
        if !ratio.is_finite() || ratio <= 0.0 || ratio > 1.0 {
            return Err(BreakerConfigError::FailureRatio(ratio));
        }
        if self.min_requests_to_trip == 0 {
            return Err(BreakerConfigError::MinRequests);
        }
        if self.open_timeout.is_zero() {
            return Err(BreakerConfigError::OpenTimeout);
        }
        if self.rolling_interval.is_some_and(|interval| interval.is_zero()) {
            return Err(BreakerConfigError::RollingInterval);
        }
        if self.success_threshold == 0 {
            return Err(BreakerConfigError::SuccessThreshold);
        }
        Ok(())
    }

    // The count check comes first so the ratio is never taken over zero requests.
    fn should_trip(&self, counts: &Counts) -> bool {
        counts.requests >= self.min_requests_to_trip
            && counts
                .failure_ratio()
                .is_some_and(|ratio| ratio >= self.failure_ratio_threshold)
    }
}

/// A call was refused without being executed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("circuit breaker '{target}' rejected the call ({state})")]
pub struct BreakerOpen {
    pub target: String,
    pub state: BreakerState,
}

/// Read-only view of a breaker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: BreakerState,
    pub counts: Counts,
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    generation: u64,
    counts: Counts,
    opened_at: Option<Instant>,
    rolling_expiry: Option<Instant>,
    probe_in_flight: bool,
}

impl Inner {
    fn new(now: Instant, settings: &BreakerSettings) -> Self {
        Self {
            state: BreakerState::Closed,
            generation: 0,
            counts: Counts::default(),
            opened_at: None,
            rolling_expiry: settings.rolling_interval.map(|interval| now + interval),
            probe_in_flight: false,
        }
    }

    /// Start a fresh Closed-state window once the rolling interval has passed.
    fn roll(&mut self, now: Instant, settings: &BreakerSettings) {
        if self.state != BreakerState::Closed {
            return;
        }
        if let (Some(expiry), Some(interval)) = (self.rolling_expiry, settings.rolling_interval) {
            if now >= expiry {
                self.generation += 1;
                self.counts = Counts::default();
                self.rolling_expiry = Some(now + interval);
            }
        }
    }

    fn transition(&mut self, to: BreakerState, now: Instant, settings: &BreakerSettings) -> (BreakerState, BreakerState, u64) {
        let from = self.state;
        self.state = to;
        self.generation += 1;
        self.counts = Counts::default();
        self.probe_in_flight = false;
        self.opened_at = (to == BreakerState::Open).then_some(now);
        self.rolling_expiry = match to {
            BreakerState::Closed => settings.rolling_interval.map(|interval| now + interval),
            _ => None,
        };
        (from, to, self.generation)
    }

    fn open_timeout_elapsed(&self, now: Instant, timeout: Duration) -> bool {
        self.opened_at
            .is_some_and(|opened_at| now.saturating_duration_since(opened_at) >= timeout)
    }
}

/// Per-target circuit breaker.
///
/// Every read and mutation goes through one mutex, so concurrent results can
/// never be lost between the increment and the trip check.
pub struct Breaker {
    name: String,
    settings: BreakerSettings,
    inner: Mutex<Inner>,
    observers: Observers,
}

impl Breaker {
    /// Create a Closed breaker after validating its settings.
    pub fn new(
        name: impl Into<String>,
        settings: BreakerSettings,
        observers: Observers,
    ) -> Result<Self, BreakerConfigError> {
        settings.validate()?;
        Ok(Self::from_validated(name.into(), settings, observers))
    }

    pub(crate) fn from_validated(name: String, settings: BreakerSettings, observers: Observers) -> Self {
        let inner = Inner::new(Instant::now(), &settings);
        Self {
            name,
            settings,
            inner: Mutex::new(inner),
            observers,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &BreakerSettings {
        &self.settings
    }

    /// Current state, without applying any pending timeout transition.
    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    /// Read-only view for observability. Never mutates the breaker.
    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        BreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            counts: inner.counts,
        }
    }

    /// Ask to run one call.
    ///
    /// Returns a [`Permit`] that must be resolved with [`Permit::record`]
    /// once the call completes, or [`BreakerOpen`] if the call must not run.
    pub fn allow(self: &Arc<Self>) -> Result<Permit, BreakerOpen> {
        let now = Instant::now();
        let mut change = None;

        let decision = {
            let mut inner = self.lock();
            inner.roll(now, &self.settings);

            let state = inner.state;
            match state {
                BreakerState::Closed => Ok(inner.generation),
                BreakerState::Open => {
                    if inner.open_timeout_elapsed(now, self.settings.open_timeout) {
                        change = Some(inner.transition(BreakerState::HalfOpen, now, &self.settings));
                        inner.probe_in_flight = true;
                        Ok(inner.generation)
                    } else {
                        Err(BreakerState::Open)
                    }
                }
                BreakerState::HalfOpen => {
                    if inner.probe_in_flight {
                        Err(BreakerState::HalfOpen)
                    } else {
                        inner.probe_in_flight = true;
                        Ok(inner.generation)
                    }
                }
            }
        };

        if let Some((from, to, generation)) = change {
            self.notify(from, to, generation);
        }

        match decision {
            Ok(generation) => Ok(Permit {
                breaker: Arc::clone(self),
                generation,
                resolved: false,
            }),
            Err(state) => Err(BreakerOpen {
                target: self.name.clone(),
                state,
            }),
        }
    }

    fn record(&self, generation: u64, success: bool) {
        let now = Instant::now();

        let change = {
            let mut inner = self.lock();
            inner.roll(now, &self.settings);

            if generation != inner.generation {
                tracing::trace!(
                    breaker = %self.name,
                    permit_generation = generation,
                    current_generation = inner.generation,
                    "Discarding result from a previous generation"
                );
                None
            } else {
                if success {
                    inner.counts.on_success();
                } else {
                    inner.counts.on_failure();
                }

                let state = inner.state;
                match state {
                    BreakerState::Closed => self
                        .settings
                        .should_trip(&inner.counts)
                        .then(|| inner.transition(BreakerState::Open, now, &self.settings)),
                    BreakerState::HalfOpen if success => {
                        if inner.counts.consecutive_successes >= self.settings.success_threshold {
                            Some(inner.transition(BreakerState::Closed, now, &self.settings))
                        } else {
                            inner.probe_in_flight = false;
                            None
                        }
                    }
                    BreakerState::HalfOpen => {
                        Some(inner.transition(BreakerState::Open, now, &self.settings))
                    }
                    // Open hands out no permits within its own generation.
                    BreakerState::Open => None,
                }
            }
        };

        if let Some((from, to, generation)) = change {
            self.notify(from, to, generation);
        }
    }

    fn notify(&self, from: BreakerState, to: BreakerState, generation: u64) {
        if to == BreakerState::Open {
            tracing::warn!(breaker = %self.name, %from, %to, "Circuit breaker state changed");
        } else {
            tracing::info!(breaker = %self.name, %from, %to, "Circuit breaker state changed");
        }
        self.observers.state_changed(&StateChange {
            name: self.name.clone(),
            from,
            to,
            generation,
        });
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Inner is plain data updated without panicking paths; a poisoned lock is still usable.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Breaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Breaker")
            .field("name", &self.name)
            .field("settings", &self.settings)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Admission ticket for one call.
///
/// A permit dropped without [`Permit::record`] counts as a failure, so the
/// breaker never loses track of a call it let through.
#[must_use = "a permit must be resolved with `record`"]
#[derive(Debug)]
pub struct Permit {
    breaker: Arc<Breaker>,
    generation: u64,
    resolved: bool,
}

impl Permit {
    /// Report the outcome of the permitted call.
    pub fn record(mut self, success: bool) {
        self.resolved = true;
        self.breaker.record(self.generation, success);
    }

    pub fn breaker(&self) -> &Breaker {
        &self.breaker
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        if !self.resolved {
            tracing::debug!(breaker = %self.breaker.name, "Permit dropped without a result, counting as failure");
            self.breaker.record(self.generation, false);
        }
    }
}
