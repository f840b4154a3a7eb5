//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the `tracing` subscriber (JSON for Cloud Logging, pretty locally)
//! - Model Cloud Logging severities, which `tracing` levels cannot express
//! - Correlate records with the trace of the originating request
//!
//! # Design Decisions
//! - Handlers log through a [`Logger`] holding an injected [`LogSink`]
//! - The production sink re-emits records as `tracing` events; the JSON
//!   formatter flattens fields so `severity` and `message` are top-level keys
//! - Writing a record never fails the caller

use std::fmt;
use std::sync::{Arc, Mutex};

use opentelemetry_sdk::trace::Tracer;
use tracing::{Level, Subscriber};
use tracing_subscriber::filter::Targets;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::{LogFormat, LoggingConfig};
use crate::http::request::RequestContext;
use crate::observability::tracing::ConfigurationError;

/// Cloud Logging severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
    Default,
    Debug,
    Info,
    Notice,
    Warning,
    Error,
    Critical,
    Alert,
    Emergency,
}

impl Severity {
    /// The eight severities a diagnostic request walks through.
    pub const DIAGNOSTIC: [Severity; 8] = [
        Severity::Default,
        Severity::Debug,
        Severity::Info,
        Severity::Notice,
        Severity::Warning,
        Severity::Critical,
        Severity::Alert,
        Severity::Emergency,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Default => "DEFAULT",
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Notice => "NOTICE",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Critical => "CRITICAL",
            Severity::Alert => "ALERT",
            Severity::Emergency => "EMERGENCY",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One structured log entry.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub severity: Severity,
    pub message: String,
    /// `projects/<project>/traces/<trace-id>`
    pub trace: Option<String>,
    pub span_id: Option<String>,
    pub trace_sampled: Option<bool>,
}

/// Destination for log records.
pub trait LogSink: Send + Sync {
    fn write(&self, record: LogRecord);
}

/// Emits records as `tracing` events for the installed subscriber.
///
/// The event level is the closest `tracing` level, used for filtering; the
/// Cloud Logging severity travels in the `severity` field.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

macro_rules! emit {
    ($level:expr, $record:expr) => {
        tracing::event!(
            $level,
            severity = $record.severity.as_str(),
            "logging.googleapis.com/trace" = $record.trace.as_deref(),
            "logging.googleapis.com/spanId" = $record.span_id.as_deref(),
            "logging.googleapis.com/trace_sampled" = $record.trace_sampled,
            "{}",
            $record.message
        )
    };
}

impl LogSink for TracingSink {
    fn write(&self, record: LogRecord) {
        match record.severity {
            Severity::Debug => emit!(Level::DEBUG, record),
            Severity::Default | Severity::Info | Severity::Notice => emit!(Level::INFO, record),
            Severity::Warning => emit!(Level::WARN, record),
            Severity::Error | Severity::Critical | Severity::Alert | Severity::Emergency => {
                emit!(Level::ERROR, record)
            }
        }
    }
}

/// Keeps records in memory.
#[derive(Debug, Default)]
pub struct CapturingSink {
    records: Mutex<Vec<LogRecord>>,
}

impl CapturingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.lock().clone()
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.lock().iter().filter(|r| r.severity == severity).count()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<LogRecord>> {
        // A poisoned buffer still holds valid records.
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl LogSink for CapturingSink {
    fn write(&self, record: LogRecord) {
        self.lock().push(record);
    }
}

/// Severity-aware logger shared by all handlers.
#[derive(Clone)]
pub struct Logger {
    sink: Arc<dyn LogSink>,
    project_id: Arc<str>,
}

impl Logger {
    pub fn new(sink: Arc<dyn LogSink>, project_id: &str) -> Self {
        Self {
            sink,
            project_id: Arc::from(project_id),
        }
    }

    /// Logger backed by the global `tracing` subscriber.
    pub fn tracing(project_id: &str) -> Self {
        Self::new(Arc::new(TracingSink), project_id)
    }

    /// Write one record, correlated with `request` when given.
    pub fn log(&self, severity: Severity, message: impl Into<String>, request: Option<&RequestContext>) {
        let trace = request.and_then(|r| r.trace.as_ref());
        let record = LogRecord {
            severity,
            message: message.into(),
            trace: trace.map(|t| format!("projects/{}/traces/{}", self.project_id, t.trace_id)),
            span_id: trace.and_then(|t| t.span_id.clone()),
            trace_sampled: trace.and_then(|t| t.sampled),
        };
        self.sink.write(record);
    }

    pub fn debug(&self, message: impl Into<String>, request: Option<&RequestContext>) {
        self.log(Severity::Debug, message, request);
    }

    pub fn notice(&self, message: impl Into<String>, request: Option<&RequestContext>) {
        self.log(Severity::Notice, message, request);
    }

    pub fn error(&self, error: &dyn std::error::Error, request: Option<&RequestContext>) {
        self.log(Severity::Error, error_chain(error), request);
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("project_id", &self.project_id)
            .finish_non_exhaustive()
    }
}

/// Render an error with its sources, `outer: inner: root`.
fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over the configured filter.
pub fn init_subscriber(config: &LoggingConfig, tracer: Tracer) -> Result<(), ConfigurationError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .map_err(|e| ConfigurationError::Subscriber(e.to_string()))?;

    subscriber(filter, config.format, tracer)
        .try_init()
        .map_err(|e| ConfigurationError::Subscriber(e.to_string()))
}

/// Registry with log output and span recording.
///
/// `filter` only applies to log output. Span recording has its own fixed
/// filter so the active trace context, and with it outbound propagation,
/// never depends on the log level.
pub fn subscriber(
    filter: EnvFilter,
    format: LogFormat,
    tracer: Tracer,
) -> impl Subscriber + Send + Sync + 'static {
    let spans = Targets::new().with_target(env!("CARGO_CRATE_NAME"), Level::INFO);
    let otel_layer = tracing_opentelemetry::layer()
        .with_tracer(tracer)
        .with_filter(spans);

    tracing_subscriber::registry()
        .with(otel_layer)
        .with(fmt_layer(format, std::io::stdout).with_filter(filter))
}

/// Log line formatter writing to `writer`.
pub fn fmt_layer<S, W>(format: LogFormat, writer: W) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    match format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_span_list(false)
            .with_writer(writer)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer().with_writer(writer).boxed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::request::TraceCorrelation;

    fn capture() -> (Arc<CapturingSink>, Logger) {
        let sink = Arc::new(CapturingSink::new());
        let logger = Logger::new(sink.clone(), "demo-project");
        (sink, logger)
    }

    #[test]
    fn test_one_record_per_severity() {
        let (sink, logger) = capture();
        for severity in Severity::DIAGNOSTIC {
            logger.log(severity, "hello", None);
        }

        let records = sink.records();
        assert_eq!(records.len(), Severity::DIAGNOSTIC.len());
        for (record, severity) in records.iter().zip(Severity::DIAGNOSTIC) {
            assert_eq!(record.severity, severity);
            assert_eq!(record.message, "hello");
            assert_eq!(record.trace, None);
        }
    }

    #[test]
    fn test_request_correlation() {
        let (sink, logger) = capture();
        let request = RequestContext {
            trace: Some(TraceCorrelation {
                trace_id: "4bf92f3577b34da6a3ce929d0e0e4736".into(),
                span_id: Some("00f067aa0ba902b7".into()),
                sampled: Some(true),
            }),
        };
        logger.notice("correlated", Some(&request));

        let record = &sink.records()[0];
        assert_eq!(
            record.trace.as_deref(),
            Some("projects/demo-project/traces/4bf92f3577b34da6a3ce929d0e0e4736")
        );
        assert_eq!(record.span_id.as_deref(), Some("00f067aa0ba902b7"));
        assert_eq!(record.trace_sampled, Some(true));
    }

    #[test]
    fn test_error_includes_sources() {
        #[derive(Debug, thiserror::Error)]
        #[error("outer")]
        struct Outer(#[source] std::io::Error);

        let (sink, logger) = capture();
        let err = Outer(std::io::Error::new(std::io::ErrorKind::Other, "root cause"));
        logger.error(&err, None);

        assert_eq!(sink.count(Severity::Error), 1);
        assert_eq!(sink.records()[0].message, "outer: root cause");
    }

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_tracing_sink_writes_cloud_logging_json() {
        let buffer = Buffer::default();
        let writer = buffer.clone();
        let subscriber =
            tracing_subscriber::registry().with(fmt_layer(LogFormat::Json, move || writer.clone()));

        let logger = Logger::tracing("demo");
        let request = RequestContext {
            trace: Some(TraceCorrelation {
                trace_id: "4bf92f3577b34da6a3ce929d0e0e4736".into(),
                span_id: Some("00f067aa0ba902b7".into()),
                sampled: Some(true),
            }),
        };
        tracing::subscriber::with_default(subscriber, || {
            for severity in Severity::DIAGNOSTIC {
                logger.log(severity, "hello", Some(&request));
            }
            logger.debug("uncorrelated", None);
        });

        let output = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        let lines: Vec<serde_json::Value> = output
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), Severity::DIAGNOSTIC.len() + 1);

        for (line, severity) in lines.iter().zip(Severity::DIAGNOSTIC) {
            assert_eq!(line["severity"], severity.as_str());
            assert_eq!(line["message"], "hello");
            assert_eq!(
                line["logging.googleapis.com/trace"],
                "projects/demo/traces/4bf92f3577b34da6a3ce929d0e0e4736"
            );
            assert_eq!(line["logging.googleapis.com/spanId"], "00f067aa0ba902b7");
            assert_eq!(line["logging.googleapis.com/trace_sampled"], true);
        }

        let last = &lines[Severity::DIAGNOSTIC.len()];
        assert_eq!(last["severity"], "DEBUG");
        assert_eq!(last["message"], "uncorrelated");
        assert!(last.get("logging.googleapis.com/trace").is_none());
    }
}
