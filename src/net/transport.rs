//! Upstream transports.
//!
//! The client's scheme picks the transport: plain HTTP goes through the
//! hyper connection pool, HTTPS through a rustls-capable reqwest client.
//! Both stream request and response bodies.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{Body, HttpBody as _};
use axum::http::{Request, Response};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use thiserror::Error;

use crate::config::UpstreamConfig;
use crate::http::request::Scheme;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("timed out")]
    Timeout,

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl TransportError {
    pub fn kind(&self) -> &'static str {
        match self {
            TransportError::Connect(_) => "connect",
            TransportError::Timeout => "timeout",
            TransportError::Protocol(_) => "protocol",
        }
    }
}

/// Sends one request to the host named in its absolute URI.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: Request<Body>) -> Result<Response<Body>, TransportError>;
}

/// True when any error in the chain is an I/O timeout.
fn caused_by_timeout(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::TimedOut {
                return true;
            }
        }
        current = e.source();
    }
    false
}

/// Plain HTTP/1.1 upstream client.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client<HttpConnector, Body>,
}

impl HttpTransport {
    pub fn new(connect_timeout: Duration) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(connect_timeout));
        connector.set_nodelay(true);
        let client = Client::builder(TokioExecutor::new()).build(connector);
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: Request<Body>) -> Result<Response<Body>, TransportError> {
        match self.client.request(request).await {
            Ok(response) => {
                let (parts, incoming) = response.into_parts();
                Ok(Response::from_parts(parts, Body::new(incoming)))
            }
            Err(e) if caused_by_timeout(&e) => Err(TransportError::Timeout),
            Err(e) if e.is_connect() => Err(TransportError::Connect(e.to_string())),
            Err(e) => Err(TransportError::Protocol(e.to_string())),
        }
    }
}

/// HTTPS upstream client. Redirects are passed through to the client.
#[derive(Clone)]
pub struct TlsTransport {
    client: reqwest::Client,
}

impl TlsTransport {
    pub fn new(connect_timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| TransportError::Protocol(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for TlsTransport {
    async fn send(&self, request: Request<Body>) -> Result<Response<Body>, TransportError> {
        let (parts, body) = request.into_parts();
        let mut builder = self
            .client
            .request(parts.method, parts.uri.to_string())
            .headers(parts.headers);
        if body.size_hint().exact() != Some(0) {
            builder = builder.body(reqwest::Body::wrap_stream(body.into_data_stream()));
        }

        let upstream = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout
            } else if e.is_connect() {
                TransportError::Connect(e.to_string())
            } else {
                TransportError::Protocol(e.to_string())
            }
        })?;

        let status = upstream.status();
        let headers = upstream.headers().clone();
        let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

/// Picks the transport for a scheme.
#[derive(Clone)]
pub struct TransportFactory {
    http: Arc<dyn Transport>,
    https: Arc<dyn Transport>,
}

impl TransportFactory {
    pub fn new(http: Arc<dyn Transport>, https: Arc<dyn Transport>) -> Self {
        Self { http, https }
    }

    pub fn from_config(config: &UpstreamConfig) -> Result<Self, TransportError> {
        let timeout = Duration::from_secs(config.connect_timeout_secs);
        Ok(Self::new(
            Arc::new(HttpTransport::new(timeout)),
            Arc::new(TlsTransport::new(timeout)?),
        ))
    }

    pub fn for_scheme(&self, scheme: Scheme) -> Arc<dyn Transport> {
        match scheme {
            Scheme::Http => self.http.clone(),
            Scheme::Https => self.https.clone(),
        }
    }
}
