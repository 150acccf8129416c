//! Forwarding to the upstream and relaying its response.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, response::Parts, HeaderMap, HeaderValue, Method, Request, Uri},
    response::Response,
};
use bytes::{Bytes, BytesMut};
use futures_util::{stream, StreamExt};
use tokio::sync::mpsc;

use crate::cache::{ResponseCache, ResponseMetadata};
use crate::http::encoding::decodable_accept_encoding;
use crate::http::error::ProxyError;
use crate::http::pipeline::{Exchange, Outcome, Stage};
use crate::http::request::RequestContext;
use crate::http::response::ResponseDispatcher;
use crate::net::TransportFactory;
use crate::observability::metrics;
use crate::security::headers::strip_hop_by_hop;

/// Chunks buffered between the upstream reader and the client.
const RELAY_CAPACITY: usize = 16;

pub struct ProxyForwarder {
    transports: TransportFactory,
    cache: ResponseCache,
    dispatcher: ResponseDispatcher,
}

impl ProxyForwarder {
    pub fn new(transports: TransportFactory, cache: ResponseCache, dispatcher: ResponseDispatcher) -> Self {
        Self {
            transports,
            cache,
            dispatcher,
        }
    }

    fn upstream_request(ctx: &RequestContext, body: Body) -> Result<Request<Body>, ProxyError> {
        let uri: Uri = ctx
            .full_url(None)
            .parse()
            .map_err(|_| ProxyError::BadRequest("Invalid URL"))?;

        let mut request = Request::new(body);
        *request.method_mut() = ctx.method.clone();
        *request.uri_mut() = uri;
        *request.headers_mut() = ctx.headers.clone();
        if ctx.lang.is_some() && ctx.method == Method::GET {
            restrict_accept_encoding(request.headers_mut());
        }
        Ok(request)
    }

    pub async fn forward(&self, ctx: &RequestContext, body: Body) -> Result<Response, ProxyError> {
        let request = Self::upstream_request(ctx, body)?;
        let transport = self.transports.for_scheme(ctx.scheme);

        let response = transport.send(request).await.map_err(|e| {
            tracing::warn!(request_id = %ctx.id, href = %ctx.href, error = %e, "Upstream request failed");
            metrics::record_upstream_error(e.kind());
            ProxyError::from(e)
        })?;

        let (parts, body) = response.into_parts();
        let metadata = ResponseMetadata::from_response(&parts, ctx.href.clone());
        tracing::debug!(
            request_id = %ctx.id,
            status = metadata.status_code,
            content_type = metadata.content_type().unwrap_or("-"),
            "Upstream responded"
        );

        let needs_translation =
            ctx.lang.is_some() && ctx.method == Method::GET && metadata.is_html();
        if !needs_translation {
            return Ok(self.relay(ctx, parts, metadata, body));
        }

        let raw = axum::body::to_bytes(body, usize::MAX).await.map_err(|e| {
            tracing::warn!(request_id = %ctx.id, error = %e, "Upstream body read failed");
            metrics::record_upstream_error("body");
            ProxyError::UpstreamResponse(e.to_string())
        })?;
        self.cache.save(ctx, None, &metadata, &raw).await;
        Ok(self.dispatcher.send_translation(raw, ctx, &metadata).await)
    }

    /// Stream the upstream body to the client, keeping a copy when the
    /// response will be cached.
    fn relay(&self, ctx: &RequestContext, mut parts: Parts, metadata: ResponseMetadata, body: Body) -> Response {
        strip_hop_by_hop(&mut parts.headers);

        let buffering = self.cache.accepts(ctx, &metadata);
        let (tx, rx) = mpsc::channel::<Result<Bytes, std::io::Error>>(RELAY_CAPACITY);
        let cache = self.cache.clone();
        let ctx = ctx.clone();

        tokio::spawn(async move {
            let mut upstream = body.into_data_stream();
            let mut buffer = BytesMut::new();
            let mut client_open = true;

            while let Some(next) = upstream.next().await {
                match next {
                    Ok(chunk) => {
                        if buffering {
                            buffer.extend_from_slice(&chunk);
                        }
                        if client_open && tx.send(Ok(chunk)).await.is_err() {
                            client_open = false;
                            let err = ProxyError::ClientStream("client closed connection".into());
                            tracing::debug!(request_id = %ctx.id, error = %err, "Client went away mid-response");
                            if !buffering {
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!(request_id = %ctx.id, error = %e, "Upstream body failed mid-stream");
                        metrics::record_upstream_error("body");
                        if client_open {
                            let _ = tx.send(Err(std::io::Error::other(e.to_string()))).await;
                        }
                        return;
                    }
                }
            }
            drop(tx);

            if buffering {
                cache.save(&ctx, None, &metadata, &buffer.freeze()).await;
            }
        });

        let client_body = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        Response::from_parts(parts, Body::from_stream(client_body))
    }
}

/// A page that may be translated must come back in a coding the
/// dispatcher can decode.
fn restrict_accept_encoding(headers: &mut HeaderMap) {
    let offered: Vec<&str> = headers
        .get_all(header::ACCEPT_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();
    let usable = decodable_accept_encoding(&offered.join(","));
    headers.remove(header::ACCEPT_ENCODING);
    if let Some(value) = usable.and_then(|v| HeaderValue::from_str(&v).ok()) {
        headers.insert(header::ACCEPT_ENCODING, value);
    }
}

#[async_trait]
impl Stage for ProxyForwarder {
    fn name(&self) -> &'static str {
        "proxy"
    }

    async fn run(&self, exchange: &mut Exchange) -> Outcome {
        let body = exchange.take_body();
        match self.forward(&exchange.ctx, body).await {
            Ok(response) => Outcome::Respond(response),
            Err(e) => Outcome::Fail(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::tests::ctx;
    use crate::cache::{CachePolicy, MemoryStore};
    use crate::config::{CacheConfig, TranslationConfig, UpstreamConfig};
    use crate::http::request::{RequestContextBuilder, RequestSequence, Scheme};
    use crate::net::transport::{Transport, TransportError};
    use crate::translation::orchestrator::tests::StubClient;
    use crate::translation::TranslationOrchestrator;
    use axum::http::{Response as HttpResponse, StatusCode};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Canned upstream that records what it was sent.
    struct FakeUpstream {
        status: u16,
        content_type: &'static str,
        body: &'static str,
        fail: bool,
        calls: AtomicUsize,
        seen: Mutex<Vec<(Method, String, Option<String>)>>,
    }

    impl FakeUpstream {
        fn new(status: u16, content_type: &'static str, body: &'static str) -> Arc<Self> {
            Arc::new(Self {
                status,
                content_type,
                body,
                fail: false,
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn down() -> Arc<Self> {
            Arc::new(Self {
                status: 0,
                content_type: "",
                body: "",
                fail: true,
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Transport for FakeUpstream {
        async fn send(&self, request: Request<Body>) -> Result<HttpResponse<Body>, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let forwarded_for = request
                .headers()
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            self.seen
                .lock()
                .unwrap()
                .push((request.method().clone(), request.uri().to_string(), forwarded_for));
            if self.fail {
                return Err(TransportError::Connect("connection refused".into()));
            }
            Ok(HttpResponse::builder()
                .status(self.status)
                .header("content-type", self.content_type)
                .header("connection", "keep-alive")
                .body(Body::from(self.body))
                .unwrap())
        }
    }

    fn forwarder(upstream: Arc<FakeUpstream>, stub: Arc<StubClient>) -> (ProxyForwarder, ResponseCache) {
        let cache = ResponseCache::new(
            Arc::new(MemoryStore::new()),
            CachePolicy::new(&CacheConfig::default()),
        );
        let orchestrator = Arc::new(TranslationOrchestrator::new(stub, &TranslationConfig::default()));
        let dispatcher = ResponseDispatcher::new(cache.clone(), orchestrator);
        let transports = TransportFactory::new(upstream.clone(), upstream);
        (ProxyForwarder::new(transports, cache.clone(), dispatcher), cache)
    }

    async fn text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn eventually_cached(cache: &ResponseCache, request: &RequestContext) -> bool {
        for _ in 0..50 {
            if cache.get(request, None).await.is_some() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn streams_and_caches_original() {
        let upstream = FakeUpstream::new(200, "text/css", "body{}");
        let (forwarder, cache) = forwarder(upstream.clone(), StubClient::upper());
        let request = ctx("GET", "/site.css?v=1&lang=fr", &[]);

        let response = forwarder.forward(&request, Body::empty()).await.unwrap();
        assert!(response.headers().get("connection").is_none());
        assert_eq!(text(response).await, "body{}");
        assert!(eventually_cached(&cache, &request).await);

        let seen = upstream.seen.lock().unwrap();
        assert_eq!(seen[0].1, "http://example.com/site.css?v=1");
        assert_eq!(seen[0].2.as_deref(), Some("127.0.0.1"));
    }

    #[tokio::test]
    async fn html_with_lang_is_translated() {
        let upstream = FakeUpstream::new(200, "text/html; charset=utf-8", "<html><body><p>hi</p></body></html>");
        let (forwarder, cache) = forwarder(upstream, StubClient::upper());
        let request = ctx("GET", "/?lang=fr", &[]);

        let response = forwarder.forward(&request, Body::empty()).await.unwrap();
        assert_eq!(response.headers()["access-control-allow-origin"], "example.com");
        assert!(text(response).await.contains("<p>HI</p>"));

        let original = cache.get(&request, None).await.unwrap();
        assert_eq!(&original.body[..], b"<html><body><p>hi</p></body></html>");
        assert!(cache.get(&request, Some("fr")).await.is_some());
    }

    #[tokio::test]
    async fn head_with_lang_is_not_translated() {
        let upstream = FakeUpstream::new(200, "text/html", "");
        let stub = StubClient::upper();
        let (forwarder, _) = forwarder(upstream, stub.clone());

        let response = forwarder.forward(&ctx("HEAD", "/?lang=fr", &[]), Body::empty()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn uncacheable_status_is_not_stored() {
        let upstream = FakeUpstream::new(302, "text/html", "moved");
        let (forwarder, cache) = forwarder(upstream, StubClient::upper());
        let request = ctx("GET", "/old", &[]);

        let response = forwarder.forward(&request, Body::empty()).await.unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(text(response).await, "moved");
        assert!(!eventually_cached(&cache, &request).await);
    }

    #[tokio::test]
    async fn connect_failure_never_reaches_cache() {
        let upstream = FakeUpstream::down();
        let (forwarder, cache) = forwarder(upstream.clone(), StubClient::upper());
        let request = ctx("GET", "/", &[]);

        let err = forwarder.forward(&request, Body::empty()).await.unwrap_err();
        assert!(matches!(err, ProxyError::UpstreamConnect(_)));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(cache.get(&request, None).await.is_none());
        assert_eq!(upstream.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn https_requests_use_https_origin() {
        let upstream = FakeUpstream::new(200, "text/plain", "ok");
        let (forwarder, _) = forwarder(upstream.clone(), StubClient::upper());
        let (parts, _) = Request::builder()
            .uri("/secure")
            .header("host", "example.com")
            .body(())
            .unwrap()
            .into_parts();
        let request = RequestContextBuilder::new(&UpstreamConfig::default(), Arc::new(RequestSequence::new()))
            .build(&parts, Scheme::Https, "127.0.0.1:9".parse().unwrap());

        forwarder.forward(&request, Body::empty()).await.unwrap();
        assert_eq!(upstream.seen.lock().unwrap()[0].1, "https://example.com/secure");
    }

    #[test]
    fn translated_requests_only_accept_decodable_codings() {
        let browser = [("accept-encoding", "gzip, deflate, br")];

        let request = ProxyForwarder::upstream_request(&ctx("GET", "/?lang=fr", &browser), Body::empty()).unwrap();
        assert_eq!(request.headers()["accept-encoding"], "gzip, deflate");

        let request = ProxyForwarder::upstream_request(&ctx("GET", "/", &browser), Body::empty()).unwrap();
        assert_eq!(request.headers()["accept-encoding"], "gzip, deflate, br");

        let brotli_only = [("accept-encoding", "br")];
        let request =
            ProxyForwarder::upstream_request(&ctx("GET", "/?lang=fr", &brotli_only), Body::empty()).unwrap();
        assert!(request.headers().get("accept-encoding").is_none());
    }

    #[tokio::test]
    async fn client_going_away_still_caches_the_page() {
        let upstream = FakeUpstream::new(200, "text/html", "<html><body>full page</body></html>");
        let (forwarder, cache) = forwarder(upstream, StubClient::upper());
        let request = ctx("GET", "/gone", &[]);

        let response = forwarder.forward(&request, Body::empty()).await.unwrap();
        drop(response);

        assert!(eventually_cached(&cache, &request).await);
        let cached = cache.get(&request, None).await.unwrap();
        assert_eq!(&cached.body[..], b"<html><body>full page</body></html>");
    }
}
