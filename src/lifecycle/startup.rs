//! Startup orchestration.
//!
//! # Responsibilities
//! - Resolve the service identity
//! - Install telemetry (tracer, subscriber, metrics)
//! - Construct the shared clients and the HTTP server
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal, the service never serves with a
//!   half-configured tracer
//! - Subsystems initialize in order, not concurrently
//! - Global installation (subscriber, tracer provider) is kept apart from
//!   server construction so the latter can be built in tests

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::clients::storage::{FileObjectStore, GcsObjectStore};
use crate::clients::{ClientError, ObjectStore, PropagatingClient};
use crate::config::{ServiceConfig, StorageAuth, StorageBackend};
use crate::http::{AppState, HttpServer};
use crate::observability::logging::init_subscriber;
use crate::observability::metrics::init_metrics;
use crate::observability::tracing::{exports_to_loopback, init_tracer};
use crate::observability::{ConfigurationError, Logger, Propagation, TelemetryGuard};
use crate::platform::{MetadataClient, ServiceIdentity};

const METADATA_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Telemetry(#[from] ConfigurationError),
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
    #[error("failed to build storage client: {0}")]
    Storage(#[from] ClientError),
    #[error("invalid metrics address '{0}'")]
    MetricsAddress(String),
}

/// Everything `main` needs to serve.
pub struct Service {
    pub server: HttpServer,
    pub telemetry: TelemetryGuard,
}

/// Resolve identity, install telemetry globally and build the server.
pub async fn bootstrap(config: &ServiceConfig) -> Result<Service, StartupError> {
    let metadata = metadata_client(config)?;
    let identity = ServiceIdentity::resolve(
        &config.service,
        metadata.as_ref().filter(|_| config.metadata.enabled),
    )
    .await;

    let tracer = init_tracer(&config.tracing, &identity)?;
    let telemetry = TelemetryGuard::new(config.tracing.enabled);
    init_subscriber(&config.logging, tracer)?;

    if config.tracing.enabled {
        tracing::info!(
            endpoint = %config.tracing.otlp_endpoint,
            sampling_ratio = config.tracing.sampling_ratio,
            "Trace export configured"
        );
        if exports_to_loopback(&config.tracing) {
            tracing::warn!(
                endpoint = %config.tracing.otlp_endpoint,
                "Trace export goes to a local collector; without a collector sidecar spans are dropped"
            );
        }
    }

    if config.metrics.enabled {
        let addr: SocketAddr = config
            .metrics
            .address
            .parse()
            .map_err(|_| StartupError::MetricsAddress(config.metrics.address.clone()))?;
        init_metrics(addr)?;
    }

    let logger = Logger::tracing(&identity.project_id);
    logger.notice(
        format!(
            "Hi 🦫 Let's start the service '{}' in project '{}'",
            identity.name, identity.project_id
        ),
        None,
    );

    let server = build_server(config, identity.clone(), logger, metadata)?;

    tracing::info!(
        service = %identity.name,
        project = %identity.project_id,
        region = %identity.region,
        revision = %identity.revision,
        routes = ?config.service.routes,
        "Service initialized"
    );

    Ok(Service { server, telemetry })
}

/// Build clients, state and router. Installs nothing globally.
pub fn build_server(
    config: &ServiceConfig,
    identity: ServiceIdentity,
    logger: Logger,
    metadata: Option<MetadataClient>,
) -> Result<HttpServer, StartupError> {
    let propagation = Propagation::new();
    let drain = CancellationToken::new();
    let http = PropagatingClient::new(
        Duration::from_secs(config.timeouts.outbound_secs),
        propagation.clone(),
        drain.clone(),
    )?;

    let storage: Arc<dyn ObjectStore> = match config.storage.backend {
        StorageBackend::Gcs => {
            let tokens = match config.storage.auth {
                StorageAuth::Metadata => metadata,
                StorageAuth::None => None,
            };
            Arc::new(GcsObjectStore::new(&config.storage.base_url, http.clone(), tokens)?)
        }
        StorageBackend::Filesystem => Arc::new(FileObjectStore::new(&config.storage.root)),
    };

    let state = AppState {
        identity: Arc::new(identity),
        logger,
        http,
        storage,
        targets: Arc::new(config.routes.clone()),
        propagation,
        drain,
    };

    Ok(HttpServer::new(config, state))
}

/// Metadata client used for identity lookups and storage tokens.
fn metadata_client(config: &ServiceConfig) -> Result<Option<MetadataClient>, StartupError> {
    let needed = config.metadata.enabled
        || (config.storage.backend == StorageBackend::Gcs
            && config.storage.auth == StorageAuth::Metadata);
    if !needed {
        return Ok(None);
    }
    Ok(Some(MetadataClient::new(&config.metadata.base_url, METADATA_TIMEOUT)?))
}
