//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Breakers and the dispatch executor produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms via BreakerObserver)
//!
//! HTTP edge produces:
//!     → metrics.rs (request counters, latency, in-flight gauge)
//!     → tower-http TraceLayer spans carrying the request ID
//!
//! Consumers:
//!     → Log aggregation (stdout, JSON lines)
//!     → Metrics endpoint (Prometheus scrape on /metrics)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Request ID flows from the edge to the backend and back
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
