//! Handler failures.
//!
//! The failure is already logged with the request's correlation when the
//! error is constructed; the response carries a status and no body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::clients::ClientError;
use crate::http::request::RequestContext;
use crate::observability::Logger;

#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct HandlerError(#[from] ClientError);

impl HandlerError {
    /// Log `error` against `request` and wrap it.
    pub fn logged(logger: &Logger, request: &RequestContext, error: ClientError) -> Self {
        logger.error(&error, Some(request));
        Self(error)
    }

    pub fn status(&self) -> StatusCode {
        match &self.0 {
            ClientError::NotFound { .. } => StatusCode::NOT_FOUND,
            ClientError::Cancelled | ClientError::Closed => StatusCode::SERVICE_UNAVAILABLE,
            ClientError::InvalidRequest(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ClientError::Transport(e) if e.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
            ClientError::Transport(_)
            | ClientError::Status { .. }
            | ClientError::Auth(_)
            | ClientError::Io(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        self.status().into_response()
    }
}
