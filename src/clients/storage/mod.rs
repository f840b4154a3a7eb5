//! Object storage access.
//!
//! # Responsibilities
//! - Open a named blob as a byte stream
//! - Map missing objects to [`ClientError::NotFound`]
//! - Release the stream on every exit path
//!
//! # Design Decisions
//! - Readers are owned `AsyncRead`s; dropping one releases the connection or
//!   file handle, so early returns cannot leak it
//! - Calls run inside the caller's current span, which makes them child spans
//!   of the handler's trace
//! - A closed store refuses new readers

pub mod fs;
pub mod gcs;

use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use tokio::io::{AsyncRead, ReadBuf};
use tokio_util::io::ReaderStream;

use crate::clients::ClientError;

pub use fs::FileObjectStore;
pub use gcs::GcsObjectStore;

/// A blob store that can be read from.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Open `bucket`/`key` for reading.
    async fn open_reader(&self, bucket: &str, key: &str) -> Result<ObjectReader, ClientError>;

    /// Release the client. Subsequent opens fail with [`ClientError::Closed`].
    async fn close(&self) -> Result<(), ClientError>;

    fn is_closed(&self) -> bool;
}

/// Open object stream.
pub struct ObjectReader {
    inner: Pin<Box<dyn AsyncRead + Send>>,
    content_type: Option<String>,
    size: Option<u64>,
}

impl ObjectReader {
    pub fn new(inner: impl AsyncRead + Send + 'static) -> Self {
        Self {
            inner: Box::pin(inner),
            content_type: None,
            size: None,
        }
    }

    pub fn with_content_type(mut self, content_type: Option<String>) -> Self {
        self.content_type = content_type;
        self
    }

    pub fn with_size(mut self, size: Option<u64>) -> Self {
        self.size = size;
        self
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn size(&self) -> Option<u64> {
        self.size
    }

    /// Chunked byte stream; the reader is released when the stream drops.
    pub fn into_stream(self) -> ReaderStream<Self> {
        ReaderStream::new(self)
    }
}

impl AsyncRead for ObjectReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.get_mut().inner.as_mut().poll_read(cx, buf)
    }
}

impl fmt::Debug for ObjectReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectReader")
            .field("content_type", &self.content_type)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}
