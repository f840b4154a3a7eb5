//! Hosting platform integration (Cloud Run).
//!
//! # Data Flow
//! ```text
//! ServiceConfig.service (file + K_SERVICE, GOOGLE_CLOUD_PROJECT, ...)
//!     → identity.rs (fill gaps)
//!         → metadata.rs (project id, region)
//!     → ServiceIdentity (immutable, shared)
//! ```

pub mod identity;
pub mod metadata;

pub use identity::ServiceIdentity;
pub use metadata::{AccessToken, MetadataClient, MetadataError};
