//! Paths and breaker targets owned by the gateway itself.

pub const HEALTH: &str = "/health";
pub const ROUTES: &str = "/route";
pub const BREAKERS: &str = "/breakers";
pub const METRICS: &str = "/metrics";

/// Every fixed endpoint, in listing order.
pub const LOCAL: [&str; 4] = [HEALTH, ROUTES, BREAKERS, METRICS];

/// Breaker guarding the health payload.
pub const HEALTH_TARGET: &str = "health";
/// Breaker guarding the route listing.
pub const ROUTES_TARGET: &str = "routes";

pub fn is_reserved_path(path: &str) -> bool {
    LOCAL.contains(&path)
}

pub fn is_reserved_target(name: &str) -> bool {
    name == HEALTH_TARGET || name == ROUTES_TARGET
}
