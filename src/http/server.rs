//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the enabled routes
//! - Wire up middleware (tracing, request ID, timeout, metrics)
//! - Serve until shutdown, drain with a bounded grace period
//! - Run the shutdown hook exactly once

use std::collections::HashSet;
use std::future::{Future, IntoFuture};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{MatchedPath, Request};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::clients::{ObjectStore, PropagatingClient};
use crate::config::{RouteTargets, ServiceConfig};
use crate::http::handlers;
use crate::http::routes::RouteKind;
use crate::lifecycle::{Lifecycle, ServiceState, ShutdownHook};
use crate::observability::metrics;
use crate::observability::tracing::RequestSpan;
use crate::observability::{Logger, Propagation};
use crate::platform::ServiceIdentity;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub identity: Arc<ServiceIdentity>,
    pub logger: Logger,
    pub http: PropagatingClient,
    pub storage: Arc<dyn ObjectStore>,
    pub targets: Arc<RouteTargets>,
    pub propagation: Propagation,
    /// Fires when draining starts; outbound calls abort on it.
    pub drain: CancellationToken,
}

/// HTTP server for the service.
pub struct HttpServer {
    router: Router,
    lifecycle: Lifecycle,
    hook: Arc<ShutdownHook>,
    drain: CancellationToken,
    grace: Duration,
}

impl HttpServer {
    /// Create a new HTTP server registering the configured routes.
    pub fn new(config: &ServiceConfig, state: AppState) -> Self {
        let hook = Arc::new(ShutdownHook::new(state.storage.clone(), state.logger.clone()));
        let drain = state.drain.clone();
        let router = Self::build_router(config, state);

        Self {
            router,
            lifecycle: Lifecycle::new(),
            hook,
            drain,
            grace: Duration::from_secs(config.timeouts.shutdown_grace_secs),
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &ServiceConfig, state: AppState) -> Router {
        let mut router = Router::new();
        let mut seen = HashSet::new();

        for route in config.service.routes.iter().copied() {
            if !seen.insert(route) {
                continue;
            }
            router = match route {
                RouteKind::Diagnostic => router.route(route.path(), get(handlers::diagnostic)),
                RouteKind::ServiceToService => {
                    router.route(route.path(), get(handlers::service_to_service))
                }
                RouteKind::GoogleService => router.route(route.path(), get(handlers::google_service)),
                RouteKind::OtelInstrumentation => {
                    router.route(route.path(), get(handlers::otel_instrumentation))
                }
            };
            tracing::debug!(route = %route, path = route.path(), "Route registered");
        }

        let propagation = state.propagation.clone();

        router
            .route_layer(middleware::from_fn(track_metrics))
            .with_state(state)
            .layer(TimeoutLayer::with_status_code(
                StatusCode::REQUEST_TIMEOUT,
                Duration::from_secs(config.timeouts.request_secs),
            ))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http().make_span_with(RequestSpan::new(propagation)))
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// The router, for in-process testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle.clone()
    }

    pub fn shutdown_hook(&self) -> Arc<ShutdownHook> {
        self.hook.clone()
    }

    /// Serve until `shutdown` resolves, then drain and run the shutdown hook.
    ///
    /// In-flight requests get the grace period to finish; outbound calls are
    /// cancelled as soon as draining starts. The hook runs even when serving
    /// failed.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");
        self.lifecycle.set(ServiceState::Serving);

        let lifecycle = self.lifecycle.clone();
        let drain = self.drain.clone();
        let signal = async move {
            shutdown.await;
            lifecycle.set(ServiceState::Draining);
            drain.cancel();
        };

        let serve = axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(signal)
            .into_future();

        let mut state = self.lifecycle.subscribe();
        let grace = self.grace;
        let deadline = async move {
            let draining = state.wait_for(|s| *s >= ServiceState::Draining).await.is_ok();
            if draining {
                tokio::time::sleep(grace).await;
            } else {
                std::future::pending::<()>().await;
            }
        };

        let result = tokio::select! {
            result = serve => result,
            _ = deadline => {
                tracing::warn!(grace_secs = grace.as_secs(), "Grace period elapsed, abandoning in-flight requests");
                Ok(())
            }
        };

        if let Err(e) = &result {
            tracing::error!(error = %e, "HTTP server failed");
        }

        if let Err(e) = self.hook.run().await {
            tracing::error!(error = %e, "Shutdown hook failed");
        }

        self.lifecycle.set(ServiceState::Stopped);
        tracing::info!("HTTP server stopped");
        result
    }
}

async fn track_metrics(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_default();

    let response = next.run(request).await;
    metrics::record_request(&route, response.status().as_u16(), start);
    response
}
