//! Serving, draining and the shutdown hook over a real listener.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::net::TcpListener;

use whats_up_log::clients::{ClientError, ObjectReader, ObjectStore};
use whats_up_log::config::ServiceConfig;
use whats_up_log::lifecycle::{ServiceState, Shutdown, FAREWELL};
use whats_up_log::observability::Severity;

mod common;
use common::MemoryStore;

/// Store whose reads never complete.
#[derive(Default)]
struct StalledStore {
    closed: AtomicBool,
}

#[async_trait]
impl ObjectStore for StalledStore {
    async fn open_reader(&self, _bucket: &str, _key: &str) -> Result<ObjectReader, ClientError> {
        std::future::pending().await
    }

    async fn close(&self) -> Result<(), ClientError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

async fn wait_for_state(lifecycle: &whats_up_log::lifecycle::Lifecycle, state: ServiceState) {
    let mut rx = lifecycle.subscribe();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| *s >= state))
        .await
        .expect("state not reached")
        .unwrap();
}

#[tokio::test]
async fn test_graceful_shutdown_runs_hook_once() {
    // 1. Start the service
    let (remote, _) = common::start_mock_backend(200, "ok").await;
    let store = Arc::new(MemoryStore::new());
    let service = common::test_service(
        &ServiceConfig::default(),
        store.clone(),
        common::targets(remote),
    );
    let lifecycle = service.server.lifecycle();
    let hook = service.server.shutdown_hook();
    assert_eq!(lifecycle.current(), ServiceState::Starting);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server = tokio::spawn(service.server.run(listener, shutdown.signal()));
    wait_for_state(&lifecycle, ServiceState::Serving).await;

    // 2. Serve a request
    let response = reqwest::get(format!("http://{addr}/")).await.unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.text().await.unwrap(), "What's up log? 🪵\n");

    // 3. Shut down
    shutdown.trigger();
    server.await.unwrap().unwrap();

    assert_eq!(lifecycle.current(), ServiceState::Stopped);
    assert!(hook.has_run());
    assert!(store.is_closed());

    let farewells = |logs: &whats_up_log::observability::CapturingSink| {
        logs.records()
            .iter()
            .filter(|r| r.message == FAREWELL && r.severity == Severity::Notice)
            .count()
    };
    assert_eq!(farewells(&service.logs), 1);

    // 4. The hook is one-shot
    assert!(!hook.run().await.unwrap());
    assert_eq!(farewells(&service.logs), 1);

    // 5. The listener is gone
    assert!(reqwest::get(format!("http://{addr}/")).await.is_err());
}

#[tokio::test]
async fn test_draining_cancels_outbound_calls() {
    let (remote, mut seen) = common::start_programmable_backend(|_| async {
        tokio::time::sleep(Duration::from_secs(10)).await;
        (200, Vec::new(), b"late".to_vec())
    })
    .await;
    let service = common::test_service(
        &ServiceConfig::default(),
        Arc::new(MemoryStore::new()),
        common::targets(remote),
    );
    let lifecycle = service.server.lifecycle();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server = tokio::spawn(service.server.run(listener, shutdown.signal()));
    wait_for_state(&lifecycle, ServiceState::Serving).await;

    let call = tokio::spawn(reqwest::get(format!("http://{addr}/service-to-service")));
    // The outbound call has reached the remote service.
    seen.recv().await.unwrap();

    let start = Instant::now();
    shutdown.trigger();

    let response = call.await.unwrap().unwrap();
    assert_eq!(response.status().as_u16(), 503);
    server.await.unwrap().unwrap();

    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(service.logs.count(Severity::Error), 1);
    assert_eq!(lifecycle.current(), ServiceState::Stopped);
}

#[tokio::test]
async fn test_grace_period_bounds_shutdown() {
    let mut config = ServiceConfig::default();
    config.timeouts.shutdown_grace_secs = 1;

    let (remote, _) = common::start_mock_backend(200, "ok").await;
    let store = Arc::new(StalledStore::default());
    let service = common::test_service(&config, store.clone(), common::targets(remote));
    let lifecycle = service.server.lifecycle();
    let hook = service.server.shutdown_hook();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server = tokio::spawn(service.server.run(listener, shutdown.signal()));
    wait_for_state(&lifecycle, ServiceState::Serving).await;

    let _stuck = tokio::spawn(reqwest::get(format!("http://{addr}/google-service")));
    tokio::time::sleep(Duration::from_millis(200)).await;

    let start = Instant::now();
    shutdown.trigger();
    server.await.unwrap().unwrap();

    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(900), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(5), "{elapsed:?}");
    assert!(hook.has_run());
    assert!(store.is_closed());
    assert_eq!(lifecycle.current(), ServiceState::Stopped);
}

#[tokio::test]
async fn test_stalled_request_times_out() {
    use tower::ServiceExt;

    let mut config = ServiceConfig::default();
    config.timeouts.request_secs = 1;

    let (remote, _) = common::start_mock_backend(200, "ok").await;
    let service = common::test_service(
        &config,
        Arc::new(StalledStore::default()),
        common::targets(remote),
    );

    let request = axum::http::Request::builder()
        .uri("/google-service")
        .body(axum::body::Body::empty())
        .unwrap();
    let start = Instant::now();
    let response = service.server.router().oneshot(request).await.unwrap();

    assert_eq!(response.status(), axum::http::StatusCode::REQUEST_TIMEOUT);
    assert!(start.elapsed() < Duration::from_secs(5));
}
