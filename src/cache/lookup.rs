//! Cache lookup stage.
//!
//! Answers GET/HEAD requests from the cache when it can:
//! - a cached variant in the requested language is sent, or 304 when the
//!   client's validators match
//! - with no translated variant, a cached original HTML page is
//!   translated without contacting the upstream, unless its coding cannot
//!   be decoded
//! - otherwise the request continues to the forwarder

use async_trait::async_trait;
use axum::http::Method;

use crate::cache::{CacheEntry, ResponseCache};
use crate::http::encoding::ContentCoding;
use crate::http::pipeline::{Exchange, Outcome, Stage};
use crate::http::request::RequestContext;
use crate::http::response::ResponseDispatcher;
use crate::observability::metrics;

pub struct CacheLookup {
    cache: ResponseCache,
    dispatcher: ResponseDispatcher,
}

impl CacheLookup {
    pub fn new(cache: ResponseCache, dispatcher: ResponseDispatcher) -> Self {
        Self { cache, dispatcher }
    }

    fn applies(&self, ctx: &RequestContext) -> bool {
        (ctx.method == Method::GET || ctx.method == Method::HEAD)
            && self.cache.is_enabled()
            && !self.cache.should_skip(ctx)
    }

    fn serve(&self, ctx: &RequestContext, entry: CacheEntry) -> Outcome {
        if self.cache.validate(ctx, &entry.metadata) {
            tracing::debug!(request_id = %ctx.id, href = %ctx.href, "Cache validated, answering 304");
            metrics::record_cache_event("not_modified");
            return Outcome::Respond(self.dispatcher.send_not_modified(&entry.metadata));
        }
        tracing::debug!(request_id = %ctx.id, href = %ctx.href, "Serving from cache");
        Outcome::Respond(self.dispatcher.send_buffer(&entry.metadata, entry.body))
    }
}

#[async_trait]
impl Stage for CacheLookup {
    fn name(&self) -> &'static str {
        "cache"
    }

    async fn run(&self, exchange: &mut Exchange) -> Outcome {
        let ctx = &exchange.ctx;
        if !self.applies(ctx) {
            return Outcome::Continue;
        }

        // HEAD is never translated, so it only has original variants.
        let lang = if ctx.method == Method::GET {
            ctx.lang.as_deref()
        } else {
            None
        };

        let Some(lang) = lang else {
            return match self.cache.get(ctx, None).await {
                Some(entry) => self.serve(ctx, entry),
                None => Outcome::Continue,
            };
        };

        if let Some(entry) = self.cache.get(ctx, Some(lang)).await {
            return self.serve(ctx, entry);
        }

        match self.cache.get(ctx, None).await {
            // An original in a coding we cannot decode is refetched in one we can.
            Some(original)
                if original.metadata.is_html()
                    && ContentCoding::parse(original.metadata.content_encoding.as_deref()).is_ok() =>
            {
                tracing::debug!(request_id = %ctx.id, lang, "Translating cached original");
                Outcome::Respond(
                    self.dispatcher
                        .send_translation(original.body, ctx, &original.metadata)
                        .await,
                )
            }
            _ => Outcome::Continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::tests::{ctx, html_meta};
    use crate::cache::{CachePolicy, MemoryStore};
    use crate::config::{CacheConfig, TranslationConfig};
    use crate::translation::orchestrator::tests::StubClient;
    use crate::translation::TranslationOrchestrator;
    use axum::body::Body;
    use axum::http::StatusCode;
    use axum::response::Response;
    use bytes::Bytes;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    fn stage(config: CacheConfig, stub: Arc<StubClient>) -> (CacheLookup, ResponseCache) {
        let cache = ResponseCache::new(Arc::new(MemoryStore::new()), CachePolicy::new(&config));
        let orchestrator = Arc::new(TranslationOrchestrator::new(stub, &TranslationConfig::default()));
        let dispatcher = ResponseDispatcher::new(cache.clone(), orchestrator);
        (CacheLookup::new(cache.clone(), dispatcher), cache)
    }

    async fn run(stage: &CacheLookup, request: RequestContext) -> Option<Response> {
        let mut exchange = Exchange::new(request, Body::empty());
        match stage.run(&mut exchange).await {
            Outcome::Respond(response) => Some(response),
            Outcome::Continue => None,
            Outcome::Fail(e) => panic!("unexpected failure: {}", e),
        }
    }

    async fn text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    const PAGE: &[u8] = b"<html><head></head><body><p>hello</p></body></html>";

    #[tokio::test]
    async fn miss_continues() {
        let (stage, _) = stage(CacheConfig::default(), StubClient::upper());
        assert!(run(&stage, ctx("GET", "/", &[])).await.is_none());
    }

    #[tokio::test]
    async fn hit_serves_original() {
        let (stage, cache) = stage(CacheConfig::default(), StubClient::upper());
        cache.save(&ctx("GET", "/", &[]), None, &html_meta(200), &Bytes::from_static(PAGE)).await;

        let response = run(&stage, ctx("GET", "/", &[])).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(text(response).await.as_bytes(), PAGE);
    }

    #[tokio::test]
    async fn matching_etag_answers_304() {
        let (stage, cache) = stage(CacheConfig::default(), StubClient::upper());
        cache.save(&ctx("GET", "/", &[]), None, &html_meta(200), &Bytes::from_static(PAGE)).await;

        let response = run(&stage, ctx("GET", "/", &[("if-none-match", "\"abc\"")])).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
    }

    #[tokio::test]
    async fn cached_original_is_translated_and_stored() {
        let stub = StubClient::upper();
        let (stage, cache) = stage(CacheConfig::default(), stub.clone());
        cache.save(&ctx("GET", "/", &[]), None, &html_meta(200), &Bytes::from_static(PAGE)).await;

        let response = run(&stage, ctx("GET", "/?lang=de", &[])).await.unwrap();
        assert!(text(response).await.contains("<p>HELLO</p>"));
        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);

        // Second request is served from the translated variant.
        let response = run(&stage, ctx("GET", "/?lang=de", &[])).await.unwrap();
        assert!(text(response).await.contains("<p>HELLO</p>"));
        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn non_html_original_is_not_translated() {
        let (stage, cache) = stage(CacheConfig::default(), StubClient::upper());
        let mut meta = html_meta(200);
        meta.set_header("content-type", "image/png");
        cache.save(&ctx("GET", "/", &[]), None, &meta, &Bytes::from_static(b"png")).await;

        assert!(run(&stage, ctx("GET", "/?lang=de", &[])).await.is_none());
    }

    #[tokio::test]
    async fn skipped_and_unsafe_requests_bypass() {
        let (stage, cache) = stage(
            CacheConfig {
                skip_cookies: vec!["nocache".into()],
                ..CacheConfig::default()
            },
            StubClient::upper(),
        );
        cache.save(&ctx("GET", "/", &[]), None, &html_meta(200), &Bytes::from_static(PAGE)).await;

        assert!(run(&stage, ctx("GET", "/", &[("cookie", "nocache=1")])).await.is_none());
        assert!(run(&stage, ctx("POST", "/", &[])).await.is_none());
    }

    #[tokio::test]
    async fn undecodable_original_is_refetched() {
        let stub = StubClient::upper();
        let (stage, cache) = stage(CacheConfig::default(), stub.clone());
        let mut meta = html_meta(200);
        meta.set_header("content-encoding", "br");
        meta.content_encoding = Some("br".into());
        cache.save(&ctx("GET", "/", &[]), None, &meta, &Bytes::from_static(b"brotli")).await;

        assert!(run(&stage, ctx("GET", "/?lang=de", &[])).await.is_none());
        assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
    }
}
