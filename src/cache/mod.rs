//! Response cache subsystem.
//!
//! # Data Flow
//! ```text
//! RequestContext + lang
//!     → keys.rs (HREF- / HEAD- / PAGE- keys over a method+URL digest)
//!     → policy.rs (cacheable? skipped? which TTL?)
//!     → store.rs / resp.rs (KeyValueStore: in-process map or RESP server)
//!
//! lookup.rs  (pipeline stage: serve hits, answer 304, reuse originals for translation)
//! purge.rs   (pipeline stage: PURGE one resource or flush everything)
//! ```
//!
//! # Design Decisions
//! - Store failures never reach the client: reads degrade to a miss and
//!   writes to a no-op
//! - Head and body live under separate keys; a half-present entry is a miss
//! - Responses are cached per method, so purges cover GET and HEAD

pub mod keys;
pub mod lookup;
pub mod metadata;
pub mod policy;
pub mod purge;
pub mod resp;
pub mod store;

use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, Method};
use bytes::Bytes;

use crate::config::schema::{StoreConfig, StoreKind};
use crate::http::request::RequestContext;
use crate::observability::metrics;

pub use keys::Namespace;
pub use lookup::CacheLookup;
pub use metadata::{CacheEntry, ResponseMetadata};
pub use policy::CachePolicy;
pub use purge::CachePurgeHandler;
pub use resp::RedisStore;
pub use store::{KeyValueStore, MemoryStore, StoreError};

/// Build the configured backing store.
pub fn build_store(config: &StoreConfig) -> Arc<dyn KeyValueStore> {
    match config.kind {
        StoreKind::Memory => Arc::new(MemoryStore::new()),
        StoreKind::Redis => Arc::new(RedisStore::new(
            config.address.clone(),
            Duration::from_millis(config.timeout_ms),
        )),
    }
}

/// Cache facade used by the pipeline stages, the forwarder and the dispatcher.
#[derive(Clone)]
pub struct ResponseCache {
    store: Arc<dyn KeyValueStore>,
    policy: CachePolicy,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn KeyValueStore>, policy: CachePolicy) -> Self {
        Self { store, policy }
    }

    pub fn key(&self, namespace: Namespace, ctx: &RequestContext, lang: Option<&str>) -> String {
        keys::cache_key(namespace, ctx, lang)
    }

    pub fn is_enabled(&self) -> bool {
        self.policy.is_enabled()
    }

    pub fn is_cacheable(&self, ctx: &RequestContext, metadata: &ResponseMetadata) -> bool {
        self.policy.is_cacheable(ctx, metadata)
    }

    pub fn should_skip(&self, ctx: &RequestContext) -> bool {
        self.policy.should_skip(ctx)
    }

    pub fn ttl(&self, metadata: &ResponseMetadata) -> Duration {
        self.policy.ttl(metadata)
    }

    /// True when [`save`](Self::save) would write this response.
    pub fn accepts(&self, ctx: &RequestContext, metadata: &ResponseMetadata) -> bool {
        self.is_enabled() && self.is_cacheable(ctx, metadata) && !self.should_skip(ctx)
    }

    /// Fetch one variant. Missing halves, undecodable heads and store
    /// errors all read as a miss.
    pub async fn get(&self, ctx: &RequestContext, lang: Option<&str>) -> Option<CacheEntry> {
        let head_key = self.key(Namespace::Head, ctx, lang);
        let page_key = self.key(Namespace::Page, ctx, lang);

        let (head, page) = tokio::join!(self.store.get(&head_key), self.store.get(&page_key));
        let (head, body) = match (head, page) {
            (Ok(Some(head)), Ok(Some(body))) => (head, body),
            (Ok(_), Ok(_)) => {
                metrics::record_cache_event("miss");
                return None;
            }
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!(request_id = %ctx.id, error = %e, "Cache read failed");
                metrics::record_cache_event("error");
                return None;
            }
        };

        match serde_json::from_slice::<ResponseMetadata>(&head) {
            Ok(metadata) => {
                metrics::record_cache_event("hit");
                Some(CacheEntry { metadata, body })
            }
            Err(e) => {
                tracing::warn!(request_id = %ctx.id, key = %head_key, error = %e, "Discarding undecodable cache head");
                metrics::record_cache_event("error");
                None
            }
        }
    }

    /// Store one variant under its three keys. Returns false when the
    /// response is refused by policy or the store rejects a write.
    pub async fn save(
        &self,
        ctx: &RequestContext,
        lang: Option<&str>,
        metadata: &ResponseMetadata,
        body: &Bytes,
    ) -> bool {
        if !self.accepts(ctx, metadata) {
            return false;
        }

        let mut metadata = metadata.clone();
        metadata.lang = lang.map(str::to_string);
        let head = match serde_json::to_vec(&metadata) {
            Ok(head) => Bytes::from(head),
            Err(e) => {
                tracing::error!(request_id = %ctx.id, error = %e, "Failed to encode cache head");
                return false;
            }
        };
        let ttl = self.ttl(&metadata);
        let href = Bytes::from(ctx.full_url(lang));

        let writes = [
            (self.key(Namespace::Href, ctx, lang), href),
            (self.key(Namespace::Head, ctx, lang), head),
            (self.key(Namespace::Page, ctx, lang), body.clone()),
        ];
        for (key, value) in writes {
            if let Err(e) = self.store.set(&key, value, ttl).await {
                tracing::warn!(request_id = %ctx.id, key = %key, error = %e, "Cache write failed");
                metrics::record_cache_event("error");
                return false;
            }
        }

        tracing::debug!(
            request_id = %ctx.id,
            href = %ctx.href,
            lang = lang.unwrap_or("-"),
            ttl_secs = ttl.as_secs(),
            "Cached response"
        );
        metrics::record_cache_event("store");
        true
    }

    /// Conditional GET against a cached head. Both validators compare as
    /// exact strings.
    pub fn validate(&self, ctx: &RequestContext, cached: &ResponseMetadata) -> bool {
        if let Some(if_none_match) = ctx.header(header::IF_NONE_MATCH.as_str()) {
            if cached.etag() == Some(if_none_match) {
                return true;
            }
        }
        if let Some(if_modified_since) = ctx.header(header::IF_MODIFIED_SINCE.as_str()) {
            if cached.last_modified() == Some(if_modified_since) {
                return true;
            }
        }
        false
    }

    /// Delete one variant for both the GET and HEAD methods.
    pub async fn purge(&self, ctx: &RequestContext, lang: Option<&str>) -> bool {
        let keys: Vec<String> = [Method::GET, Method::HEAD]
            .into_iter()
            .flat_map(|method| {
                let variant = ctx.with_method(method);
                Namespace::ALL
                    .into_iter()
                    .map(move |ns| keys::cache_key(ns, &variant, lang))
            })
            .collect();

        match self.store.delete(&keys).await {
            Ok(deleted) => {
                tracing::info!(request_id = %ctx.id, href = %ctx.href, lang = lang.unwrap_or("-"), deleted, "Purged resource");
                metrics::record_cache_event("purge");
                true
            }
            Err(e) => {
                tracing::warn!(request_id = %ctx.id, error = %e, "Purge failed");
                metrics::record_cache_event("error");
                false
            }
        }
    }

    pub async fn purge_all(&self) -> bool {
        match self.store.flush_all().await {
            Ok(()) => {
                tracing::info!("Flushed response cache");
                metrics::record_cache_event("purge_all");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "Cache flush failed");
                metrics::record_cache_event("error");
                false
            }
        }
    }
}
