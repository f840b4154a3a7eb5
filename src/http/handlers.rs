//! Route handlers.
//!
//! Every handler logs through the shared [`Logger`](crate::observability::Logger)
//! and fails fast: an outbound error is logged once and the handler returns.
//! There are no retries.

use axum::body::Body;
use axum::extract::State;
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE, HOST};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::Response;
use futures_util::TryStreamExt;
use tracing::Instrument;

use crate::clients::ClientError;
use crate::http::error::HandlerError;
use crate::http::request::RequestContext;
use crate::http::server::AppState;
use crate::observability::Severity;

pub const DIAGNOSTIC_BODY: &str = "What's up log? 🪵\n";
pub const WORK_DONE_BODY: &str = "work completed\n";
pub const CALLED: &str = "I got called!";
pub const WORK_SPAN: &str = "/otel-instrumentation";

/// `GET /`
pub async fn diagnostic(
    State(state): State<AppState>,
    request: RequestContext,
    headers: HeaderMap,
) -> &'static str {
    let logger = &state.logger;

    for severity in Severity::DIAGNOSTIC {
        logger.log(severity, CALLED, Some(&request));
    }

    logger.debug(format!("I am running in region '{}'", state.identity.region), None);

    // Host is request metadata, not a header entry.
    for (name, value) in headers.iter().filter(|(name, _)| *name != HOST) {
        logger.debug(
            format!("[HEADER] '{}': '{}'", name, String::from_utf8_lossy(value.as_bytes())),
            Some(&request),
        );
    }

    DIAGNOSTIC_BODY
}

/// `GET /service-to-service`
pub async fn service_to_service(
    State(state): State<AppState>,
    request: RequestContext,
) -> Result<String, HandlerError> {
    state.logger.debug("I am calling someone else!", Some(&request));

    let response = state
        .http
        .get(&state.targets.remote_service_url)
        .await
        .map_err(|e| HandlerError::logged(&state.logger, &request, e))?;

    Ok(format!("{}\n", status_line(response.status())))
}

/// `GET /google-service`
pub async fn google_service(
    State(state): State<AppState>,
    request: RequestContext,
) -> Result<Response, HandlerError> {
    state.logger.debug("I am calling Cloud Storage!", Some(&request));

    let targets = &state.targets;
    let reader = state
        .storage
        .open_reader(&targets.bucket, &targets.object)
        .await
        .map_err(|e| HandlerError::logged(&state.logger, &request, e))?;

    let content_type = reader
        .content_type()
        .and_then(|ct| HeaderValue::from_str(ct).ok())
        .unwrap_or(HeaderValue::from_static("application/octet-stream"));
    let size = reader.size();

    // Headers are already sent when a read fails, so the body is cut short.
    let logger = state.logger.clone();
    let stream = reader.into_stream().inspect_err(move |e| {
        logger.log(Severity::Error, format!("copying object failed: {e}"), Some(&request));
    });

    let mut response = Response::new(Body::from_stream(stream));
    response.headers_mut().insert(CONTENT_TYPE, content_type);
    if let Some(size) = size {
        response.headers_mut().insert(CONTENT_LENGTH, HeaderValue::from(size));
    }
    Ok(response)
}

/// `GET /otel-instrumentation`
pub async fn otel_instrumentation(
    State(state): State<AppState>,
    request: RequestContext,
) -> Result<&'static str, HandlerError> {
    state.logger.debug("I am doing some work!", Some(&request));

    let span = tracing::info_span!(
        WORK_SPAN,
        "service.name" = %state.targets.span_service_name,
    );

    let targets = &state.targets;
    let work = async {
        let reader = state
            .storage
            .open_reader(&targets.bucket, &targets.traced_object)
            .await?;
        tracing::debug!(content_type = ?reader.content_type(), "Object opened");
        Ok::<_, ClientError>(())
    };

    // The span ends when the instrumented future is dropped, on both paths.
    work.instrument(span)
        .await
        .map_err(|e| HandlerError::logged(&state.logger, &request, e))?;

    Ok(WORK_DONE_BODY)
}

/// `200 OK`, or just the code when the reason is unknown.
fn status_line(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {}", status.as_str(), reason),
        None => status.as_str().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_line() {
        assert_eq!(status_line(StatusCode::OK), "200 OK");
        assert_eq!(status_line(StatusCode::SERVICE_UNAVAILABLE), "503 Service Unavailable");
        assert_eq!(status_line(StatusCode::from_u16(599).unwrap()), "599");
    }
}
