//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the dispatch executor and register one breaker per target
//! - Compile the route table with a forwarder per route
//! - Create Axum Router with the gateway endpoints and proxy fallback
//! - Wire up middleware (tracing, timeout, request ID, metrics)
//! - Serve until the shutdown signal fires

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{middleware, routing::get, Router};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use url::Url;

use crate::config::GatewayConfig;
use crate::http::forwarder::{Forwarder, HttpClient};
use crate::http::handlers;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};
use crate::observability::metrics::{self, MetricsRecorder};
use crate::resilience::{BreakerConfigError, BreakerObserver, DispatchExecutor, Observers};
use crate::routing::endpoint::{self, HEALTH_TARGET, ROUTES_TARGET};
use crate::routing::RouteTable;

/// Startup failure while assembling the server. Always fatal.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error(transparent)]
    Breaker(#[from] BreakerConfigError),

    #[error("route '{route}': backend '{backend}' is not a valid URL: {source}")]
    Backend {
        route: String,
        backend: String,
        #[source]
        source: url::ParseError,
    },
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub executor: Arc<DispatchExecutor>,
    pub routes: Arc<RouteTable<Forwarder>>,
    pub endpoints: Arc<[String]>,
    pub metrics: Option<PrometheusHandle>,
}

/// The edge gateway's HTTP server.
pub struct GatewayServer {
    router: Router,
    state: AppState,
}

impl GatewayServer {
    /// Build the server from validated configuration.
    ///
    /// `metrics` is the handle rendered on `/metrics`; `None` disables the endpoint.
    pub fn new(config: &GatewayConfig, metrics: Option<PrometheusHandle>) -> Result<Self, SetupError> {
        let recorder: Arc<dyn BreakerObserver> = Arc::new(MetricsRecorder::new());
        let defaults = config.breaker.to_settings();
        let executor = Arc::new(DispatchExecutor::new(defaults.clone(), Observers::new(vec![recorder]))?);
        executor.register(HEALTH_TARGET, defaults.clone())?;
        executor.register(ROUTES_TARGET, defaults)?;

        let client: HttpClient = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        let upstream_timeout = Duration::from_secs(config.timeouts.upstream_secs);

        let mut routes = RouteTable::new();
        for route in &config.routes {
            let backend = Url::parse(&route.backend).map_err(|source| SetupError::Backend {
                route: route.name.clone(),
                backend: route.backend.clone(),
                source,
            })?;

            let settings = route.breaker_config(&config.breaker).to_settings();
            executor.register(&route.name, settings)?;

            tracing::info!(
                route = %route.name,
                prefix = %route.path_prefix,
                backend = %backend,
                "Route configured"
            );
            let forwarder = Forwarder::new(
                &route.name,
                &route.path_prefix,
                backend,
                client.clone(),
                upstream_timeout,
            );
            routes.register(&route.name, &route.path_prefix, route.host.as_deref(), forwarder);
        }

        let endpoints: Arc<[String]> = endpoint::LOCAL
            .iter()
            .map(|path| path.to_string())
            .chain(routes.routes().map(|route| route.prefix.clone()))
            .collect();

        let state = AppState {
            executor,
            routes: Arc::new(routes),
            endpoints,
            metrics,
        };
        let router = Self::build_router(state.clone(), Duration::from_secs(config.timeouts.request_secs));

        Ok(Self { router, state })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(state: AppState, request_timeout: Duration) -> Router {
        Router::new()
            .route(endpoint::HEALTH, get(handlers::health))
            .route(endpoint::ROUTES, get(handlers::routes))
            .route(endpoint::BREAKERS, get(handlers::breakers))
            .route(endpoint::METRICS, get(handlers::metrics))
            .fallback(handlers::proxy)
            .with_state(state)
            .layer(TimeoutLayer::new(request_timeout))
            .layer(middleware::from_fn(metrics::track_http))
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http())
            .layer(set_request_id_layer())
    }

    /// The assembled router, for driving the gateway without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Serve on `listener` until `shutdown` fires, then drain in-flight requests.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            routes = self.state.routes.len(),
            "Gateway listening"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown requested, draining connections");
            })
            .await?;

        tracing::info!("Gateway stopped");
        Ok(())
    }
}
