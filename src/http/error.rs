//! Client-facing error responses.
//!
//! Every error renders as a plain-text `Error <code>: <reason>` body.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::net::transport::TransportError;

/// Errors that end a request with an HTTP error status.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("{0}")]
    BadRequest(&'static str),

    #[error("PURGE not allowed")]
    PurgeForbidden,

    #[error("upstream connection failed: {0}")]
    UpstreamConnect(String),

    #[error("upstream protocol error: {0}")]
    UpstreamProtocol(String),

    #[error("upstream response failed: {0}")]
    UpstreamResponse(String),

    #[error("upstream timed out")]
    UpstreamTimeout,

    #[error("client stream failed: {0}")]
    ClientStream(String),

    #[error("request context missing")]
    MissingContext,

    #[error("no stage handled the request")]
    Unhandled,
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::PurgeForbidden => StatusCode::FORBIDDEN,
            ProxyError::UpstreamConnect(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::UpstreamProtocol(_) => StatusCode::BAD_GATEWAY,
            ProxyError::UpstreamResponse(_) => StatusCode::SERVICE_UNAVAILABLE,
            ProxyError::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::ClientStream(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::MissingContext => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::Unhandled => StatusCode::NOT_IMPLEMENTED,
        }
    }

    /// Reason shown to the client. Internal detail stays in the logs.
    pub fn reason(&self) -> &str {
        match self {
            ProxyError::BadRequest(reason) => reason,
            other => other.status().canonical_reason().unwrap_or("Error"),
        }
    }
}

impl From<TransportError> for ProxyError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Connect(msg) => ProxyError::UpstreamConnect(msg),
            TransportError::Timeout => ProxyError::UpstreamTimeout,
            TransportError::Protocol(msg) => ProxyError::UpstreamProtocol(msg),
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = format!("Error {}: {}", status.as_u16(), self.reason());
        (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            body,
        )
            .into_response()
    }
}
