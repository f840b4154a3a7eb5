//! Inbound request context.
//!
//! # Responsibilities
//! - Extract trace correlation (W3C `traceparent`, falling back to
//!   `X-Cloud-Trace-Context`) so log records can be joined with traces
//!
//! # Design Decisions
//! - Extraction never fails; a request without trace headers simply has no
//!   correlation
//! - Malformed headers are ignored rather than rejected

use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;

pub const TRACEPARENT: &str = "traceparent";
pub const X_CLOUD_TRACE_CONTEXT: &str = "x-cloud-trace-context";

/// Trace identifiers carried by an inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceCorrelation {
    /// 32 lowercase hex digits.
    pub trace_id: String,
    pub span_id: Option<String>,
    pub sampled: Option<bool>,
}

impl TraceCorrelation {
    /// Read correlation from request headers.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let header = |name| headers.get(name).and_then(|v| v.to_str().ok());

        header(TRACEPARENT)
            .and_then(parse_traceparent)
            .or_else(|| header(X_CLOUD_TRACE_CONTEXT).and_then(parse_cloud_trace_context))
    }
}

/// `00-<trace-id>-<parent-id>-<flags>`
fn parse_traceparent(value: &str) -> Option<TraceCorrelation> {
    let mut parts = value.trim().split('-');
    let version = parts.next()?;
    let trace_id = parts.next()?;
    let span_id = parts.next()?;
    let flags = parts.next()?;

    if version.len() != 2 || version == "ff" {
        return None;
    }
    if !is_hex(trace_id, 32) || trace_id.bytes().all(|b| b == b'0') {
        return None;
    }
    if !is_hex(span_id, 16) || !is_hex(flags, 2) {
        return None;
    }
    let flags = u8::from_str_radix(flags, 16).ok()?;

    Some(TraceCorrelation {
        trace_id: trace_id.to_ascii_lowercase(),
        span_id: Some(span_id.to_ascii_lowercase()),
        sampled: Some(flags & 0x01 == 0x01),
    })
}

/// `TRACE_ID/SPAN_ID;o=OPTIONS`, where the span id is decimal.
fn parse_cloud_trace_context(value: &str) -> Option<TraceCorrelation> {
    let (ids, options) = match value.split_once(';') {
        Some((ids, options)) => (ids, Some(options)),
        None => (value, None),
    };
    let (trace_id, span_id) = match ids.split_once('/') {
        Some((trace_id, span_id)) => (trace_id, Some(span_id)),
        None => (ids, None),
    };

    if !is_hex(trace_id, 32) {
        return None;
    }
    let span_id = span_id
        .and_then(|s| s.parse::<u64>().ok())
        .map(|s| format!("{s:016x}"));
    let sampled = options
        .and_then(|o| o.strip_prefix("o="))
        .map(|o| o.trim() == "1");

    Some(TraceCorrelation {
        trace_id: trace_id.to_ascii_lowercase(),
        span_id,
        sampled,
    })
}

fn is_hex(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Per-request data handlers pass to the logger.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub trace: Option<TraceCorrelation>,
}

impl RequestContext {
    pub fn from_parts(parts: &Parts) -> Self {
        Self {
            trace: TraceCorrelation::from_headers(&parts.headers),
        }
    }
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_parts(parts))
    }
}
