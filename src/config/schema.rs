//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::http::routes::RouteKind;

/// Root configuration for the service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Service identity overrides and enabled routes.
    pub service: IdentityConfig,

    /// Targets used by the route handlers.
    pub routes: RouteTargets,

    /// Object storage backend.
    pub storage: StorageConfig,

    /// Trace export settings.
    pub tracing: TracingConfig,

    /// Log output settings.
    pub logging: LoggingConfig,

    /// Metrics endpoint settings.
    pub metrics: MetricsConfig,

    /// Metadata server access.
    pub metadata: MetadataConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,
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

/// Identity overrides. Unset fields are resolved from the platform.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub name: Option<String>,
    pub project_id: Option<String>,
    pub region: Option<String>,
    pub revision: Option<String>,

    /// Routes registered on the router.
    pub routes: Vec<RouteKind>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            name: None,
            project_id: None,
            region: None,
            revision: None,
            routes: RouteKind::ALL.to_vec(),
        }
    }
}

/// Remote targets the handlers talk to.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RouteTargets {
    /// Remote service called by `/service-to-service`.
    pub remote_service_url: String,

    /// Bucket read by the storage routes.
    pub bucket: String,

    /// Object streamed back by `/google-service`.
    pub object: String,

    /// Object opened inside the `/otel-instrumentation` span.
    pub traced_object: String,

    /// Value of the `service.name` attribute on the work span.
    pub span_service_name: String,
}

impl Default for RouteTargets {
    fn default() -> Self {
        Self {
            remote_service_url: "https://whats-up-log-549074658641.europe-north2.run.app".to_string(),
            bucket: "gcs-whats-up-log".to_string(),
            object: "pikachu.jpg".to_string(),
            traced_object: "pikachu.png".to_string(),
            span_service_name: "brite-demo".to_string(),
        }
    }
}

/// Which object store implementation to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Gcs,
    Filesystem,
}

/// How the GCS client authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageAuth {
    /// Bearer token from the metadata server.
    Metadata,
    /// Anonymous requests (emulators, public buckets).
    None,
}

/// Object storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,

    /// GCS JSON API base URL.
    pub base_url: String,

    pub auth: StorageAuth,

    /// Root directory for the filesystem backend.
    pub root: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Gcs,
            base_url: "https://storage.googleapis.com".to_string(),
            auth: StorageAuth::Metadata,
            root: "./data".to_string(),
        }
    }
}

/// Trace export configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TracingConfig {
    /// Export spans over OTLP. When disabled spans stay local.
    pub enabled: bool,

    /// OTLP gRPC endpoint. The default expects a collector sidecar (for
    /// example the OpenTelemetry Collector with the Cloud Trace exporter);
    /// point it at a reachable collector when running without one.
    pub otlp_endpoint: String,

    /// Fraction of traces recorded, in `[0, 1]`.
    pub sampling_ratio: f64,

    /// Export RPC timeout in seconds.
    pub export_timeout_secs: u64,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            otlp_endpoint: "http://localhost:4317".to_string(),
            sampling_ratio: 0.1,
            export_timeout_secs: 3,
        }
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One flattened JSON object per line (Cloud Logging).
    Json,
    /// Human readable, for local runs.
    Pretty,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,

    /// Default filter directives, overridden by `RUST_LOG`.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Json,
            filter: "whats_up_log=debug,tower_http=info".to_string(),
        }
    }
}

/// Metrics configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Enable the Prometheus scrape endpoint.
    pub enabled: bool,

    /// Metrics endpoint bind address.
    pub address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Metadata server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetadataConfig {
    /// Query the metadata server for identity fields left unset.
    pub enabled: bool,

    pub base_url: String,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "http://metadata.google.internal".to_string(),
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,

    /// Timeout for a single outbound HTTP call in seconds.
    pub outbound_secs: u64,

    /// How long in-flight requests may run after a termination signal.
    pub shutdown_grace_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            outbound_secs: 10,
            shutdown_grace_secs: 8,
        }
    }
}
