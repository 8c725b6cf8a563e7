//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (ratios, timeouts, thresholds)
//! - Check route names, prefixes and backend URLs
//! - Detect routes shadowing the gateway's own endpoints
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use url::Url;

use crate::config::schema::GatewayConfig;
use crate::resilience::BreakerConfigError;
use crate::routing::endpoint;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("listener.bind_address '{0}' is not a socket address")]
    BindAddress(String),

    #[error("timeouts.{0} must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("{scope}: {source}")]
    Breaker {
        scope: String,
        #[source]
        source: BreakerConfigError,
    },

    #[error("route #{0} has an empty name")]
    EmptyRouteName(usize),

    #[error("route '{0}' is defined more than once")]
    DuplicateRoute(String),

    #[error("route '{route}': path prefix '{prefix}' must start with '/'")]
    PrefixNotAbsolute { route: String, prefix: String },

    #[error("route '{route}': path prefix '{prefix}' collides with a gateway endpoint")]
    ReservedPrefix { route: String, prefix: String },

    #[error("route '{route}': backend '{backend}' is not a valid http URL")]
    InvalidBackend { route: String, backend: String },
}

/// Validate the whole configuration, collecting every error.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("request_secs"));
    }
    if config.timeouts.upstream_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("upstream_secs"));
    }

    if let Err(source) = config.breaker.to_settings().validate() {
        errors.push(ValidationError::Breaker {
            scope: "breaker".to_string(),
            source,
        });
    }

    let mut names = HashSet::new();
    for (index, route) in config.routes.iter().enumerate() {
        if route.name.trim().is_empty() {
            errors.push(ValidationError::EmptyRouteName(index));
        } else if !names.insert(route.name.as_str()) || endpoint::is_reserved_target(&route.name) {
            errors.push(ValidationError::DuplicateRoute(route.name.clone()));
        }

        if !route.path_prefix.starts_with('/') {
            errors.push(ValidationError::PrefixNotAbsolute {
                route: route.name.clone(),
                prefix: route.path_prefix.clone(),
            });
        } else if endpoint::is_reserved_path(route.path_prefix.trim_end_matches('/')) {
            errors.push(ValidationError::ReservedPrefix {
                route: route.name.clone(),
                prefix: route.path_prefix.clone(),
            });
        }

        let backend_ok = Url::parse(&route.backend)
            .map(|url| url.scheme() == "http" && url.host().is_some())
            .unwrap_or(false);
        if !backend_ok {
            errors.push(ValidationError::InvalidBackend {
                route: route.name.clone(),
                backend: route.backend.clone(),
            });
        }

        if route.breaker.is_some() {
            if let Err(source) = route.breaker_config(&config.breaker).to_settings().validate() {
                errors.push(ValidationError::Breaker {
                    scope: format!("routes.{}.breaker", route.name),
                    source,
                });
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
