//! Forwarding to a route's backend.
//!
//! # Responsibilities
//! - Strip the route prefix and rebase the path onto the backend URL
//! - Clean hop-by-hop headers in both directions, append `x-forwarded-for`
//! - Ask the dispatch executor to run the upstream call behind the route's breaker
//!
//! # Design Decisions
//! - The breaker guards the attempt up to the response head; the body is
//!   streamed afterwards and cannot be un-sent, so it is not part of the call
//! - Only transport errors and upstream timeouts are failures; any response
//!   the backend produces (5xx included) is passed through as is

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{
        uri::InvalidUri,
        HeaderMap, HeaderName, HeaderValue, Request, StatusCode, Uri,
    },
    response::Response,
};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use url::{Position, Url};

use crate::http::response;
use crate::resilience::DispatchExecutor;

/// Pooled HTTP/1.1 client shared by every forwarder.
pub type HttpClient = Client<HttpConnector, Body>;

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("upstream request failed: {0}")]
    Request(#[from] hyper_util::client::legacy::Error),

    #[error("upstream did not answer within {0:?}")]
    Timeout(Duration),

    #[error("invalid upstream uri: {0}")]
    InvalidUri(#[from] InvalidUri),
}

/// Remove `prefix` from the front of `path`.
///
/// The result always starts with `/`; a path equal to the prefix becomes `/`.
/// Paths the prefix does not anchor at a segment boundary are returned
/// unchanged.
pub fn strip_prefix(path: &str, prefix: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let stripped = match path.strip_prefix(prefix) {
        Some(rest) if rest.is_empty() => "/",
        Some(rest) if rest.starts_with('/') => rest,
        _ => path,
    };

    if stripped.is_empty() {
        "/".to_string()
    } else {
        stripped.to_string()
    }
}

/// Remove hop-by-hop headers, including those named by `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all("connection")
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(*name);
    }
}

/// Forwards one route's traffic to its backend.
#[derive(Debug, Clone)]
pub struct Forwarder {
    route: String,
    prefix: String,
    backend: Url,
    client: HttpClient,
    upstream_timeout: Duration,
}

impl Forwarder {
    pub fn new(
        route: impl Into<String>,
        prefix: impl Into<String>,
        backend: Url,
        client: HttpClient,
        upstream_timeout: Duration,
    ) -> Self {
        Self {
            route: route.into(),
            prefix: prefix.into(),
            backend,
            client,
            upstream_timeout,
        }
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    pub fn backend(&self) -> &Url {
        &self.backend
    }

    /// Backend URI for an inbound request URI. The query string is kept.
    pub fn upstream_uri(&self, uri: &Uri) -> Result<Uri, InvalidUri> {
        let origin = &self.backend[..Position::BeforePath];
        let base = self.backend.path().trim_end_matches('/');
        let path = strip_prefix(uri.path(), &self.prefix);

        let mut target = format!("{origin}{base}{path}");
        if let Some(query) = uri.query() {
            target.push('?');
            target.push_str(query);
        }
        Uri::try_from(target)
    }

    /// Rewrite an inbound request for the backend.
    pub fn prepare(&self, request: Request<Body>) -> Result<Request<Body>, UpstreamError> {
        let (mut parts, body) = request.into_parts();
        parts.uri = self.upstream_uri(&parts.uri)?;

        strip_hop_by_hop(&mut parts.headers);
        parts.headers.remove("host");

        if let Some(ConnectInfo(addr)) = parts.extensions.get::<ConnectInfo<SocketAddr>>() {
            let client_ip = addr.ip().to_string();
            let forwarded = match parts
                .headers
                .get(&X_FORWARDED_FOR)
                .and_then(|value| value.to_str().ok())
            {
                Some(prior) => format!("{prior}, {client_ip}"),
                None => client_ip,
            };
            if let Ok(value) = HeaderValue::from_str(&forwarded) {
                parts.headers.insert(X_FORWARDED_FOR, value);
            }
        }

        Ok(Request::from_parts(parts, body))
    }

    /// Forward `request` behind this route's breaker.
    pub async fn forward(&self, executor: &DispatchExecutor, request: Request<Body>) -> Response {
        let request = match self.prepare(request) {
            Ok(request) => request,
            Err(err) => {
                tracing::error!(route = %self.route, error = %err, "Could not build upstream request");
                return response::error_response(StatusCode::BAD_GATEWAY, "Bad Gateway");
            }
        };

        tracing::debug!(route = %self.route, upstream = %request.uri(), "Forwarding request");

        let client = self.client.clone();
        let limit = self.upstream_timeout;
        let outcome = executor
            .execute(&self.route, async move {
                match tokio::time::timeout(limit, client.request(request)).await {
                    Ok(Ok(mut upstream)) => {
                        strip_hop_by_hop(upstream.headers_mut());
                        Ok(upstream)
                    }
                    Ok(Err(err)) => Err(UpstreamError::Request(err)),
                    Err(_) => Err(UpstreamError::Timeout(limit)),
                }
            })
            .await;

        response::encode(&self.route, outcome, StatusCode::BAD_GATEWAY)
    }
}
