//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::resilience::BreakerSettings;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Route definitions mapping path prefixes to backends.
    pub routes: Vec<RouteConfig>,

    /// Default circuit breaker settings.
    pub breaker: BreakerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Route configuration: one path prefix, one backend, one breaker.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Route identifier; also names the route's circuit breaker.
    pub name: String,

    /// Path prefix to match and strip before forwarding.
    pub path_prefix: String,

    /// Host header to match (exact match, case-insensitive).
    #[serde(default)]
    pub host: Option<String>,

    /// Backend base URL (e.g., "http://service:8080").
    pub backend: String,

    /// Per-route breaker overrides; omitted keys inherit the global `[breaker]` section.
    #[serde(default)]
    pub breaker: Option<BreakerOverride>,
}

impl RouteConfig {
    /// Effective breaker configuration for this route.
    pub fn breaker_config(&self, defaults: &BreakerConfig) -> BreakerConfig {
        match &self.breaker {
            Some(overrides) => overrides.apply(defaults),
            None => defaults.clone(),
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct BreakerConfig {
    /// Failure ratio (0, 1] at which a closed breaker trips.
    pub failure_ratio_threshold: f64,

    /// Minimum calls in the current window before the ratio is considered.
    pub min_requests_to_trip: u32,

    /// Time an open breaker waits before admitting a probe, in milliseconds.
    pub open_timeout_ms: u64,

    /// Closed-state counting window in milliseconds (0 = never reset).
    pub rolling_interval_ms: u64,

    /// Consecutive probe successes required to close again.
    pub success_threshold: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_ratio_threshold: 0.8,
            min_requests_to_trip: 5,
            open_timeout_ms: 30_000,
            rolling_interval_ms: 60_000,
            success_threshold: 1,
        }
    }
}

impl BreakerConfig {
    /// Convert to runtime settings. Validation happens separately.
    pub fn to_settings(&self) -> BreakerSettings {
        BreakerSettings {
            failure_ratio_threshold: self.failure_ratio_threshold,
            min_requests_to_trip: self.min_requests_to_trip,
            open_timeout: Duration::from_millis(self.open_timeout_ms),
            rolling_interval: (self.rolling_interval_ms > 0)
                .then(|| Duration::from_millis(self.rolling_interval_ms)),
            success_threshold: self.success_threshold,
        }
    }
}

/// Partial breaker configuration layered over the global section.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Default)]
#[serde(default)]
pub struct BreakerOverride {
    pub failure_ratio_threshold: Option<f64>,
    pub min_requests_to_trip: Option<u32>,
    pub open_timeout_ms: Option<u64>,
    pub rolling_interval_ms: Option<u64>,
    pub success_threshold: Option<u32>,
}

impl BreakerOverride {
    pub fn apply(&self, base: &BreakerConfig) -> BreakerConfig {
        BreakerConfig {
            failure_ratio_threshold: self.failure_ratio_threshold.unwrap_or(base.failure_ratio_threshold),
            min_requests_to_trip: self.min_requests_to_trip.unwrap_or(base.min_requests_to_trip),
            open_timeout_ms: self.open_timeout_ms.unwrap_or(base.open_timeout_ms),
            rolling_interval_ms: self.rolling_interval_ms.unwrap_or(base.rolling_interval_ms),
            success_threshold: self.success_threshold.unwrap_or(base.success_threshold),
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for the edge request) in seconds.
    pub request_secs: u64,

    /// Deadline for a backend to return response headers, in seconds.
    pub upstream_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            upstream_secs: 10,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Include file and line in log entries.
    pub log_add_source: bool,

    /// Serve Prometheus metrics on `/metrics`.
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Json,
            log_add_source: false,
            metrics_enabled: true,
        }
    }
}
