//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Handlers produce:
//!     → logging.rs (severity-leveled records, correlated by trace id)
//!     → tracing.rs (spans, parented on the caller's propagated context)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → Cloud Logging (JSON lines on stdout)
//!     → Trace backend (OTLP, batched, sampled)
//!     → Prometheus scrape (optional)
//! ```

pub mod logging;
pub mod metrics;
pub mod tracing;

pub use logging::{CapturingSink, LogRecord, LogSink, Logger, Severity, TracingSink};
pub use self::tracing::{ConfigurationError, Propagation, TelemetryGuard};
