//! Service identity.
//!
//! Resolved once at startup: configuration (which already carries the
//! Cloud Run environment) first, then the metadata server, then `local`.

use crate::config::schema::IdentityConfig;
use crate::platform::metadata::MetadataClient;

pub const UNKNOWN: &str = "local";

/// Read-only, process-wide identity of the running service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceIdentity {
    pub name: String,
    pub project_id: String,
    pub region: String,
    pub revision: String,
}

impl ServiceIdentity {
    /// Identity built from configuration only.
    pub fn from_config(config: &IdentityConfig) -> Self {
        let or_unknown = |v: &Option<String>| v.clone().unwrap_or_else(|| UNKNOWN.to_string());
        Self {
            name: or_unknown(&config.name),
            project_id: or_unknown(&config.project_id),
            region: or_unknown(&config.region),
            revision: or_unknown(&config.revision),
        }
    }

    /// Fill fields the configuration left unset from the metadata server.
    ///
    /// Lookup failures are logged and leave the field at `local`; running
    /// off-platform is normal.
    pub async fn resolve(config: &IdentityConfig, metadata: Option<&MetadataClient>) -> Self {
        let mut identity = Self::from_config(config);
        let Some(metadata) = metadata else {
            return identity;
        };

        if config.project_id.is_none() {
            match metadata.project_id().await {
                Ok(project_id) => identity.project_id = project_id,
                Err(e) => tracing::debug!(error = %e, "Project id unavailable from metadata server"),
            }
        }
        if config.region.is_none() {
            match metadata.region().await {
                Ok(region) => identity.region = region,
                Err(e) => tracing::debug!(error = %e, "Region unavailable from metadata server"),
            }
        }

        identity
    }
}
