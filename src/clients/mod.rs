//! Outbound clients.
//!
//! # Data Flow
//! ```text
//! handler (inside request span)
//!     → http.rs (inject traceparent/baggage, timeout, drain cancellation)
//!         → remote service
//!     → storage (ObjectStore)
//!         → gcs.rs → http.rs → storage.googleapis.com
//!         → fs.rs  → local directory
//! ```
//!
//! # Design Decisions
//! - Clients are constructed once and shared; they are safe for concurrent use
//! - Handles (responses, readers) release their resources on drop

pub mod http;
pub mod storage;

use reqwest::StatusCode;

use crate::platform::MetadataError;

pub use self::http::PropagatingClient;
pub use storage::{ObjectReader, ObjectStore};

/// Failure of an outbound call.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{url} returned {status}")]
    Status { url: String, status: StatusCode },
    #[error("object gs://{bucket}/{key} not found")]
    NotFound { bucket: String, key: String },
    #[error("storage credentials unavailable: {0}")]
    Auth(#[from] MetadataError),
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("call cancelled: service is shutting down")]
    Cancelled,
    #[error("client is closed")]
    Closed,
}

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound { .. })
    }
}
