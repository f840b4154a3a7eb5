//! HTTP client that propagates trace context.

use std::time::Duration;

use reqwest::{Method, Request, Response};
use tokio_util::sync::CancellationToken;
use tracing::field::Empty;
use tracing::Instrument;

use crate::clients::ClientError;
use crate::observability::metrics::{self, Outcome};
use crate::observability::Propagation;

/// Wraps `reqwest::Client` so every request carries the current trace context.
///
/// Each call runs in a client span; the injected `traceparent` names that span
/// as the callee's parent. Calls abort with [`ClientError::Cancelled`] once the
/// drain token fires.
#[derive(Debug, Clone)]
pub struct PropagatingClient {
    inner: reqwest::Client,
    propagation: Propagation,
    drain: CancellationToken,
}

impl PropagatingClient {
    pub fn new(
        timeout: Duration,
        propagation: Propagation,
        drain: CancellationToken,
    ) -> Result<Self, reqwest::Error> {
        let inner = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            inner,
            propagation,
            drain,
        })
    }

    /// Start building a request; send it with [`execute`](Self::execute).
    pub fn request(&self, method: Method, url: impl reqwest::IntoUrl) -> reqwest::RequestBuilder {
        self.inner.request(method, url)
    }

    pub async fn get(&self, url: &str) -> Result<Response, ClientError> {
        let request = self.inner.get(url).build()?;
        self.execute(request).await
    }

    pub async fn execute(&self, mut request: Request) -> Result<Response, ClientError> {
        let span = tracing::info_span!(
            "outbound",
            "otel.name" = %format!("{} {}", request.method(), request.url().host_str().unwrap_or("")),
            "otel.kind" = "client",
            "http.request.method" = %request.method(),
            "url.full" = %request.url(),
            "http.response.status_code" = Empty,
        );

        async move {
            self.propagation.inject(request.headers_mut());

            let result = tokio::select! {
                biased;
                _ = self.drain.cancelled() => Err(ClientError::Cancelled),
                result = self.inner.execute(request) => result.map_err(ClientError::from),
            };

            match &result {
                Ok(response) => {
                    tracing::Span::current()
                        .record("http.response.status_code", response.status().as_u16());
                    metrics::record_outbound("http", Outcome::Success);
                }
                Err(ClientError::Cancelled) => metrics::record_outbound("http", Outcome::Cancelled),
                Err(_) => metrics::record_outbound("http", Outcome::Error),
            }
            result
        }
        .instrument(span)
        .await
    }
}
