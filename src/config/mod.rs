//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize, environment overrides)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → consumed once at startup by the server and executor
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; breakers live for the process lifetime
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Any configuration error is fatal at startup

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{apply_env_overrides, load_config, parse_config, ConfigError};
pub use schema::{
    BreakerConfig, BreakerOverride, GatewayConfig, ListenerConfig, LogFormat, ObservabilityConfig, RouteConfig,
    TimeoutConfig,
};
pub use validation::{validate_config, ValidationError};
