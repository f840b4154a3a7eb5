//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, request span from propagated context)
//!     → request.rs (trace correlation for logging)
//!     → handlers.rs (log, call out, respond)
//!         → error.rs (outbound failure → status, empty body)
//!     → Send to client
//! ```

pub mod error;
pub mod handlers;
pub mod request;
pub mod routes;
pub mod server;

pub use error::HandlerError;
pub use request::{RequestContext, TraceCorrelation};
pub use routes::RouteKind;
pub use server::{AppState, HttpServer};
