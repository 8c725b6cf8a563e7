//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware)
//!     → request.rs (assign request ID)
//!     → handlers.rs (gateway endpoints) or proxy fallback
//!         → routing table picks the route
//!         → forwarder.rs (rewrite, guarded upstream call)
//!     → response.rs (outcome → status and body)
//!     → Send to client
//! ```

pub mod forwarder;
pub mod handlers;
pub mod request;
pub mod response;
pub mod server;

pub use forwarder::{strip_prefix, Forwarder, UpstreamError};
pub use request::X_REQUEST_ID;
pub use server::{AppState, GatewayServer, SetupError};
