//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, ratio within bounds)
//! - Check that enabled routes have the targets they need
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServiceConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::{ServiceConfig, StorageBackend};
use crate::http::routes::RouteKind;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Validate a configuration, collecting every error.
pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    let routes = &config.service.routes;
    if routes.is_empty() {
        errors.push(ValidationError::new("service.routes", "at least one route must be enabled"));
    }

    if routes.contains(&RouteKind::ServiceToService) {
        check_url(&mut errors, "routes.remote_service_url", &config.routes.remote_service_url);
    }

    if routes.iter().any(|r| r.uses_storage()) {
        if config.routes.bucket.is_empty() {
            errors.push(ValidationError::new("routes.bucket", "must not be empty"));
        }
        if routes.contains(&RouteKind::GoogleService) && config.routes.object.is_empty() {
            errors.push(ValidationError::new("routes.object", "must not be empty"));
        }
        if routes.contains(&RouteKind::OtelInstrumentation) && config.routes.traced_object.is_empty() {
            errors.push(ValidationError::new("routes.traced_object", "must not be empty"));
        }
        if config.storage.backend == StorageBackend::Gcs {
            check_url(&mut errors, "storage.base_url", &config.storage.base_url);
        }
    }

    let ratio = config.tracing.sampling_ratio;
    if !(0.0..=1.0).contains(&ratio) {
        errors.push(ValidationError::new(
            "tracing.sampling_ratio",
            format!("{ratio} is outside [0, 1]"),
        ));
    }
    if config.tracing.enabled {
        check_url(&mut errors, "tracing.otlp_endpoint", &config.tracing.otlp_endpoint);
    }

    if config.metrics.enabled && config.metrics.address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "metrics.address",
            format!("'{}' is not a socket address", config.metrics.address),
        ));
    }

    if config.metadata.enabled {
        check_url(&mut errors, "metadata.base_url", &config.metadata.base_url);
    }

    let timeouts = &config.timeouts;
    for (field, value) in [
        ("timeouts.request_secs", timeouts.request_secs),
        ("timeouts.outbound_secs", timeouts.outbound_secs),
        ("timeouts.shutdown_grace_secs", timeouts.shutdown_grace_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be greater than zero"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_url(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if let Err(e) = url::Url::parse(value) {
        errors.push(ValidationError::new(field, format!("'{value}' is not a URL: {e}")));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(validate_config(&ServiceConfig::default()), Ok(()));
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = ServiceConfig::default();
        config.tracing.sampling_ratio = 1.5;
        config.timeouts.request_secs = 0;
        config.routes.bucket = String::new();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec!["routes.bucket", "tracing.sampling_ratio", "timeouts.request_secs"]
        );
    }

    #[test]
    fn test_storage_targets_only_checked_when_needed() {
        let mut config = ServiceConfig::default();
        config.service.routes = vec![RouteKind::Diagnostic];
        config.routes.bucket = String::new();
        config.routes.remote_service_url = "not a url".into();
        assert_eq!(validate_config(&config), Ok(()));
    }

    #[test]
    fn test_empty_route_set() {
        let mut config = ServiceConfig::default();
        config.service.routes.clear();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "service.routes");
    }
}
