//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Guarded call for a target:
//!     → dispatch.rs (look up the target's breaker, ask for a permit)
//!     → circuit_breaker.rs (permit or fail-fast rejection)
//!     → dispatch.rs (run the work, catch panics, record the result)
//!     → events.rs (state changes and call observations to observers)
//! ```
//!
//! # Design Decisions
//! - Breakers are owned by the executor and injected, never global
//! - Every path resolves to a `CallOutcome`; nothing propagates as a panic
//! - Observability is an observer seam, not hard-wired into the state machine

pub mod circuit_breaker;
pub mod dispatch;
pub mod events;

pub use circuit_breaker::{
    Breaker, BreakerConfigError, BreakerOpen, BreakerSettings, BreakerSnapshot, BreakerState,
    Counts, Permit,
};
pub use dispatch::{CallFailure, CallOutcome, DispatchExecutor};
pub use events::{BreakerObserver, CallObservation, Observers, OutcomeKind, StateChange};
