//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::io::Cursor;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, ReadBuf};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::span;
use tracing_subscriber::layer::Context as LayerContext;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

use whats_up_log::clients::{ClientError, ObjectReader, ObjectStore, PropagatingClient};
use whats_up_log::config::{RouteTargets, ServiceConfig};
use whats_up_log::http::{AppState, HttpServer};
use whats_up_log::observability::{CapturingSink, Logger, Propagation};
use whats_up_log::platform::ServiceIdentity;

/// A request head as seen by a mock backend.
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub request_line: String,
    pub headers: HashMap<String, String>,
}

fn status_text(status: u16) -> String {
    let reason = axum::http::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown");
    format!("{status} {reason}")
}

async fn read_head(socket: &mut tokio::net::TcpStream) -> Option<SeenRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let head = String::from_utf8_lossy(&buf).to_string();
    let mut lines = head.split("\r\n");
    let request_line = lines.next()?.to_string();
    let headers = lines
        .take_while(|l| !l.is_empty())
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();
    Some(SeenRequest {
        request_line,
        headers,
    })
}

/// Start a programmable mock backend on an ephemeral port.
///
/// `f` decides status, extra headers and body per request. Every request head
/// is forwarded on the returned channel.
pub async fn start_programmable_backend<F, Fut>(
    f: F,
) -> (SocketAddr, mpsc::UnboundedReceiver<SeenRequest>)
where
    F: Fn(SeenRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, Vec<(String, String)>, Vec<u8>)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        let Some(seen) = read_head(&mut socket).await else {
                            return;
                        };
                        let _ = tx.send(seen.clone());
                        let (status, headers, body) = f(seen).await;

                        let mut head = format!(
                            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n",
                            status_text(status),
                            body.len()
                        );
                        for (name, value) in headers {
                            head.push_str(&format!("{name}: {value}\r\n"));
                        }
                        head.push_str("\r\n");

                        let _ = socket.write_all(head.as_bytes()).await;
                        let _ = socket.write_all(&body).await;
                        let _ = socket.shutdown().await;
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    (addr, rx)
}

/// Start a simple mock backend that returns a fixed response.
pub async fn start_mock_backend(
    status: u16,
    body: &'static str,
) -> (SocketAddr, mpsc::UnboundedReceiver<SeenRequest>) {
    start_programmable_backend(move |_| async move { (status, Vec::new(), body.as_bytes().to_vec()) })
        .await
}

/// An address nothing listens on.
pub async fn refused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// In-memory object store that tracks open readers.
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<(String, String), Vec<u8>>>,
    opens: AtomicUsize,
    live: Arc<AtomicUsize>,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_object(self, bucket: &str, key: &str, data: &[u8]) -> Self {
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), data.to_vec());
        self
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Readers handed out and not yet dropped.
    pub fn live_readers(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

struct TrackedReader {
    inner: Cursor<Vec<u8>>,
    live: Arc<AtomicUsize>,
}

impl AsyncRead for TrackedReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}

impl Drop for TrackedReader {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn open_reader(&self, bucket: &str, key: &str) -> Result<ObjectReader, ClientError> {
        if self.is_closed() {
            return Err(ClientError::Closed);
        }
        self.opens.fetch_add(1, Ordering::SeqCst);

        let data = self
            .objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| ClientError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })?;

        self.live.fetch_add(1, Ordering::SeqCst);
        let size = data.len() as u64;
        Ok(ObjectReader::new(TrackedReader {
            inner: Cursor::new(data),
            live: self.live.clone(),
        })
        .with_content_type(Some("image/jpeg".to_string()))
        .with_size(Some(size)))
    }

    async fn close(&self) -> Result<(), ClientError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Targets pointing at a remote service and a test bucket.
pub fn targets(remote: SocketAddr) -> RouteTargets {
    RouteTargets {
        remote_service_url: format!("http://{remote}/"),
        bucket: "test-bucket".into(),
        object: "pikachu.jpg".into(),
        traced_object: "pikachu.png".into(),
        span_service_name: "brite-demo".into(),
    }
}

/// A server wired to a capturing log sink and the given store.
pub struct TestService {
    pub server: HttpServer,
    pub logs: Arc<CapturingSink>,
}

pub fn test_service(
    config: &ServiceConfig,
    storage: Arc<dyn ObjectStore>,
    targets: RouteTargets,
) -> TestService {
    let logs = Arc::new(CapturingSink::new());
    let propagation = Propagation::new();
    let drain = CancellationToken::new();
    let http = PropagatingClient::new(Duration::from_secs(5), propagation.clone(), drain.clone())
        .unwrap();

    let state = AppState {
        identity: Arc::new(ServiceIdentity {
            name: "whats-up-log".into(),
            project_id: "demo-project".into(),
            region: "europe-north2".into(),
            revision: "whats-up-log-00001".into(),
        }),
        logger: Logger::new(logs.clone(), "demo-project"),
        http,
        storage,
        targets: Arc::new(targets),
        propagation,
        drain,
    };

    TestService {
        server: HttpServer::new(config, state),
        logs,
    }
}

/// Counts opens and closes of spans with a given name.
#[derive(Clone)]
pub struct SpanCounter {
    name: &'static str,
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
}

impl SpanCounter {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            opened: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

impl<S> Layer<S> for SpanCounter
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &span::Attributes<'_>, _id: &span::Id, _ctx: LayerContext<'_, S>) {
        if attrs.metadata().name() == self.name {
            self.opened.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn on_close(&self, id: span::Id, ctx: LayerContext<'_, S>) {
        if ctx.span(&id).is_some_and(|s| s.name() == self.name) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}
