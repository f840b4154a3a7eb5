//! Distributed tracing support.
//!
//! # Responsibilities
//! - Build the OTLP trace pipeline (ratio sampler, batched export)
//! - Extract trace context from incoming requests
//! - Propagate trace context to outbound requests
//!
//! # Design Decisions
//! - Spans are `tracing` spans bridged by `tracing-opentelemetry`, so a span
//!   ends when its last handle drops
//! - W3C Trace Context and Baggage, combined in one composite propagator
//! - Pipeline setup failure is fatal at startup

use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, HeaderName, HeaderValue, Request};
use opentelemetry::propagation::{
    Extractor, Injector, TextMapCompositePropagator, TextMapPropagator,
};
use opentelemetry::trace::{TraceError, TracerProvider as _};
use opentelemetry::{Context, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::propagation::{BaggagePropagator, TraceContextPropagator};
use opentelemetry_sdk::trace::{BatchConfig, RandomIdGenerator, Sampler, Tracer, TracerProvider};
use opentelemetry_sdk::{runtime, Resource};
use tower_http::trace::MakeSpan;
use tracing::Span;
use tracing_opentelemetry::OpenTelemetrySpanExt;
use url::{Host, Url};

use crate::config::TracingConfig;
use crate::platform::identity::ServiceIdentity;

/// Telemetry setup failure. Always fatal.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("trace exporter setup failed: {0}")]
    Exporter(#[from] TraceError),
    #[error("subscriber setup failed: {0}")]
    Subscriber(String),
    #[error("metrics setup failed: {0}")]
    Metrics(String),
}

fn composite_propagator() -> TextMapCompositePropagator {
    TextMapCompositePropagator::new(vec![
        Box::new(TraceContextPropagator::new()),
        Box::new(BaggagePropagator::new()),
    ])
}

/// Build the OTLP pipeline and install it as the global tracer provider.
///
/// When export is disabled the provider has no exporter: spans stay local but
/// still carry trace context to outbound calls.
pub fn init_tracer(
    config: &TracingConfig,
    identity: &ServiceIdentity,
) -> Result<Tracer, ConfigurationError> {
    opentelemetry::global::set_text_map_propagator(composite_propagator());

    if !config.enabled {
        let provider = TracerProvider::builder().build();
        let tracer = provider.tracer(identity.name.clone());
        // The tracer only holds a weak reference; the global keeps it alive.
        opentelemetry::global::set_tracer_provider(provider);
        return Ok(tracer);
    }

    let tracer = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_trace_config(
            opentelemetry_sdk::trace::Config::default()
                .with_sampler(Sampler::TraceIdRatioBased(config.sampling_ratio))
                .with_id_generator(RandomIdGenerator::default())
                .with_resource(Resource::new(vec![
                    KeyValue::new("service.name", identity.name.clone()),
                    KeyValue::new("service.version", identity.revision.clone()),
                    KeyValue::new("gcp.project_id", identity.project_id.clone()),
                    KeyValue::new("cloud.region", identity.region.clone()),
                ])),
        )
        .with_batch_config(BatchConfig::default())
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(config.otlp_endpoint.clone())
                .with_timeout(Duration::from_secs(config.export_timeout_secs)),
        )
        .install_batch(runtime::Tokio)?;

    Ok(tracer)
}

/// Whether spans are exported to this host, which needs a collector sidecar
/// on Cloud Run.
pub fn exports_to_loopback(config: &TracingConfig) -> bool {
    let Ok(url) = Url::parse(&config.otlp_endpoint) else {
        return false;
    };
    match url.host() {
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(ip)) => ip.is_loopback(),
        Some(Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    }
}

/// Flushes exported spans before the process exits.
#[derive(Debug)]
#[must_use = "spans are lost unless the guard is shut down"]
pub struct TelemetryGuard {
    exporting: bool,
}

impl TelemetryGuard {
    pub fn new(exporting: bool) -> Self {
        Self { exporting }
    }

    /// Flush pending batches and shut the provider down. Blocks.
    pub fn shutdown(self) {
        if self.exporting {
            opentelemetry::global::shutdown_tracer_provider();
        }
    }
}

/// Trace context propagation over HTTP headers.
#[derive(Clone)]
pub struct Propagation {
    propagator: Arc<TextMapCompositePropagator>,
}

impl Propagation {
    pub fn new() -> Self {
        Self {
            propagator: Arc::new(composite_propagator()),
        }
    }

    /// Read `traceparent` / `baggage` from inbound headers.
    pub fn extract(&self, headers: &HeaderMap) -> Context {
        self.propagator.extract(&HeaderExtractor(headers))
    }

    /// Write the context of the current span into outbound headers.
    pub fn inject(&self, headers: &mut HeaderMap) {
        self.inject_context(&Span::current().context(), headers);
    }

    pub fn inject_context(&self, cx: &Context, headers: &mut HeaderMap) {
        self.propagator.inject_context(cx, &mut HeaderInjector(headers));
    }
}

impl Default for Propagation {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Propagation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Propagation")
            .field("fields", &self.propagator.fields().collect::<Vec<_>>())
            .finish()
    }
}

struct HeaderInjector<'a>(&'a mut HeaderMap);

impl Injector for HeaderInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            self.0.insert(name, value);
        }
    }
}

struct HeaderExtractor<'a>(&'a HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(HeaderName::as_str).collect()
    }
}

/// Request span whose parent is the caller's propagated context.
#[derive(Debug, Clone)]
pub struct RequestSpan {
    propagation: Propagation,
}

impl RequestSpan {
    pub fn new(propagation: Propagation) -> Self {
        Self { propagation }
    }
}

impl<B> MakeSpan<B> for RequestSpan {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        let span = tracing::info_span!(
            "request",
            "otel.name" = %format!("{} {}", request.method(), request.uri().path()),
            "otel.kind" = "server",
            method = %request.method(),
            uri = %request.uri(),
            version = ?request.version(),
        );
        span.set_parent(self.propagation.extract(request.headers()));
        span
    }
}
