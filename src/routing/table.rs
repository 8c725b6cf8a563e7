//! Route table.
//!
//! # Responsibilities
//! - Store compiled routes with their handlers
//! - Look up the matching route for a request
//! - Return matched route or explicit no-match
//!
//! # Design Decisions
//! - Built at startup, immutable at runtime (shared via Arc without locks)
//! - Longest prefix wins; host-restricted routes beat host-agnostic ones of equal length
//! - Explicit NoMatch rather than silent default

use axum::body::Body;
use axum::http::Request;

use crate::routing::matcher::{AndMatcher, HostMatcher, Matcher, PathPrefixMatcher};

/// A registered route and the handler it dispatches to.
#[derive(Debug)]
pub struct Route<H> {
    pub name: String,
    pub prefix: String,
    pub host: Option<String>,
    matcher: AndMatcher,
    pub handler: H,
}

impl<H> Route<H> {
    pub fn matches(&self, req: &Request<Body>) -> bool {
        self.matcher.matches(req)
    }
}

/// Prefix route table.
#[derive(Debug)]
pub struct RouteTable<H> {
    routes: Vec<Route<H>>,
}

impl<H> Default for RouteTable<H> {
    fn default() -> Self {
        Self { routes: Vec::new() }
    }
}

impl<H> RouteTable<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for requests under `prefix` (and `host`, if given).
    pub fn register(&mut self, name: impl Into<String>, prefix: &str, host: Option<&str>, handler: H) {
        let path_matcher = PathPrefixMatcher::new(prefix);
        let prefix = if path_matcher.prefix().is_empty() {
            "/".to_string()
        } else {
            path_matcher.prefix().to_string()
        };

        let mut matchers: Vec<Box<dyn Matcher>> = vec![Box::new(path_matcher)];
        if let Some(host) = host {
            matchers.push(Box::new(HostMatcher::new(host)));
        }

        let route = Route {
            name: name.into(),
            prefix,
            host: host.map(str::to_string),
            matcher: AndMatcher::new(matchers),
            handler,
        };
        tracing::debug!(route = %route.name, prefix = %route.prefix, host = ?route.host, "Route registered");

        self.routes.push(route);
        self.routes.sort_by(|a, b| {
            let specificity = |r: &Route<H>| (r.prefix.trim_end_matches('/').len(), r.host.is_some());
            specificity(b).cmp(&specificity(a))
        });
    }

    /// First (most specific) route matching the request.
    pub fn match_request(&self, req: &Request<Body>) -> Option<&Route<H>> {
        self.routes.iter().find(|route| route.matches(req))
    }

    pub fn routes(&self) -> impl Iterator<Item = &Route<H>> {
        self.routes.iter()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
