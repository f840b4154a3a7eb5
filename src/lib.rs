//! Instrumented demo service for Cloud Run.

pub mod clients;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod platform;

pub use config::schema::ServiceConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
