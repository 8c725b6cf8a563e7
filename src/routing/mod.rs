//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (host, path)
//!     → axum router (fixed gateway endpoints, see endpoint.rs)
//!     → fallback: table.rs (prefix route lookup)
//!     → matcher.rs (evaluate match conditions)
//!     → Return: matched Route (with its forwarder) or NoMatch
//!
//! Route Compilation (at startup):
//!     RouteConfig[]
//!     → register each prefix with its handler
//!     → sort by specificity
//!     → freeze behind Arc
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same input always matches same route

pub mod endpoint;
pub mod matcher;
pub mod table;

pub use table::{Route, RouteTable};
