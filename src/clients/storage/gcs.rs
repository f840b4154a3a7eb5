//! Cloud Storage over the JSON API.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::TryStreamExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, StatusCode};
use tokio::sync::Mutex;
use tokio_util::io::StreamReader;
use tracing::Instrument;
use url::Url;

use crate::clients::storage::{ObjectReader, ObjectStore};
use crate::clients::{ClientError, PropagatingClient};
use crate::observability::metrics::{self, Outcome};
use crate::platform::MetadataClient;

/// Tokens are refreshed this long before they expire.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// Reads objects with `GET /storage/v1/b/{bucket}/o/{object}?alt=media`.
pub struct GcsObjectStore {
    base_url: Url,
    client: PropagatingClient,
    metadata: Option<MetadataClient>,
    token: Mutex<Option<CachedToken>>,
    closed: AtomicBool,
}

impl GcsObjectStore {
    /// `metadata` supplies bearer tokens; `None` sends anonymous requests.
    pub fn new(
        base_url: &str,
        client: PropagatingClient,
        metadata: Option<MetadataClient>,
    ) -> Result<Self, ClientError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ClientError::InvalidRequest(format!("storage base url: {e}")))?;
        Ok(Self {
            base_url,
            client,
            metadata,
            token: Mutex::new(None),
            closed: AtomicBool::new(false),
        })
    }

    /// Media download URL; bucket and object are percent-encoded as single
    /// path segments.
    pub fn object_url(&self, bucket: &str, key: &str) -> Result<Url, ClientError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidRequest(format!("'{}' cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(["storage", "v1", "b", bucket, "o", key]);
        url.query_pairs_mut().append_pair("alt", "media");
        Ok(url)
    }

    async fn bearer_token(&self) -> Result<Option<String>, ClientError> {
        let Some(metadata) = &self.metadata else {
            return Ok(None);
        };

        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| Instant::now() < t.refresh_at) {
            return Ok(Some(token.value.clone()));
        }

        let token = metadata.access_token().await?;
        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_REFRESH_MARGIN);
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });
        Ok(Some(token.access_token))
    }

    async fn open(&self, bucket: &str, key: &str) -> Result<ObjectReader, ClientError> {
        let url = self.object_url(bucket, key)?;

        let mut request = self.client.request(Method::GET, url.clone());
        if let Some(token) = self.bearer_token().await? {
            request = request.bearer_auth(token);
        }

        let response = self.client.execute(request.build()?).await?;
        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND => {
                return Err(ClientError::NotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                })
            }
            status => {
                return Err(ClientError::Status {
                    url: url.to_string(),
                    status,
                })
            }
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let size = response.content_length();
        let body = response.bytes_stream().map_err(std::io::Error::other);

        Ok(ObjectReader::new(StreamReader::new(body))
            .with_content_type(content_type)
            .with_size(size))
    }
}

#[async_trait]
impl ObjectStore for GcsObjectStore {
    async fn open_reader(&self, bucket: &str, key: &str) -> Result<ObjectReader, ClientError> {
        if self.is_closed() {
            return Err(ClientError::Closed);
        }

        let span = tracing::info_span!(
            "storage.open_reader",
            "otel.kind" = "client",
            bucket = %bucket,
            object = %key,
        );
        let result = self.open(bucket, key).instrument(span).await;

        let outcome = match &result {
            Ok(_) => Outcome::Success,
            Err(ClientError::NotFound { .. }) => Outcome::NotFound,
            Err(ClientError::Cancelled) => Outcome::Cancelled,
            Err(_) => Outcome::Error,
        };
        metrics::record_outbound("storage", outcome);
        result
    }

    async fn close(&self) -> Result<(), ClientError> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!(base_url = %self.base_url, "Storage client closed");
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
