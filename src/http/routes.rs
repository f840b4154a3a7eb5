//! Declarative route set.
//!
//! Each deployment variant is a list of [`RouteKind`]s; the router only
//! registers what is listed.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A route the service can expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RouteKind {
    /// `GET /`: logs every severity and the inbound headers.
    Diagnostic,
    /// `GET /service-to-service`: calls a remote service with propagated context.
    ServiceToService,
    /// `GET /google-service`: streams an object from storage.
    GoogleService,
    /// `GET /otel-instrumentation`: opens an object inside a custom span.
    OtelInstrumentation,
}

impl RouteKind {
    pub const ALL: [RouteKind; 4] = [
        RouteKind::Diagnostic,
        RouteKind::ServiceToService,
        RouteKind::GoogleService,
        RouteKind::OtelInstrumentation,
    ];

    /// Path the route is mounted at.
    pub fn path(self) -> &'static str {
        match self {
            RouteKind::Diagnostic => "/",
            RouteKind::ServiceToService => "/service-to-service",
            RouteKind::GoogleService => "/google-service",
            RouteKind::OtelInstrumentation => "/otel-instrumentation",
        }
    }

    pub fn uses_storage(self) -> bool {
        matches!(self, RouteKind::GoogleService | RouteKind::OtelInstrumentation)
    }

    fn key(self) -> &'static str {
        match self {
            RouteKind::Diagnostic => "diagnostic",
            RouteKind::ServiceToService => "service-to-service",
            RouteKind::GoogleService => "google-service",
            RouteKind::OtelInstrumentation => "otel-instrumentation",
        }
    }
}

impl fmt::Display for RouteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown route '{0}'")]
pub struct UnknownRoute(String);

impl FromStr for RouteKind {
    type Err = UnknownRoute;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RouteKind::ALL
            .into_iter()
            .find(|r| r.key() == s || r.path() == s)
            .ok_or_else(|| UnknownRoute(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_by_key_or_path() {
        assert_eq!("diagnostic".parse::<RouteKind>().unwrap(), RouteKind::Diagnostic);
        assert_eq!(
            "/google-service".parse::<RouteKind>().unwrap(),
            RouteKind::GoogleService
        );
        assert!("/nope".parse::<RouteKind>().is_err());
    }

    #[test]
    fn test_display_matches_serde() {
        for route in RouteKind::ALL {
            let json = serde_json::to_string(&route).unwrap();
            assert_eq!(json, format!("\"{route}\""));
        }
    }
}
