//! PURGE verb handling.
//!
//! `PURGE /path[?lang=xx]` drops one resource (both GET and HEAD variants);
//! `PURGE /?page=all` (the configured bulk marker) flushes the whole store.
//! A PURGE never reaches the upstream.

use async_trait::async_trait;
use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};

use crate::cache::ResponseCache;
use crate::http::error::ProxyError;
use crate::http::is_purge;
use crate::http::pipeline::{Exchange, Outcome, Stage};
use crate::http::request::RequestContext;

pub const PURGED_ONE: &str = "Purged page from cache\n";
pub const PURGED_ALL: &str = "Purged all pages from cache\n";

pub struct CachePurgeHandler {
    cache: ResponseCache,
    bulk_marker: String,
}

impl CachePurgeHandler {
    pub fn new(cache: ResponseCache, bulk_marker: impl Into<String>) -> Self {
        Self {
            cache,
            bulk_marker: bulk_marker.into(),
        }
    }

    fn is_bulk(&self, ctx: &RequestContext) -> bool {
        ctx.query()
            .map(|q| q.split('&').any(|pair| pair == self.bulk_marker))
            .unwrap_or(false)
    }

    /// Answer a PURGE. Without a context there is nothing to address.
    pub async fn handle(&self, ctx: Option<&RequestContext>) -> Response {
        let Some(ctx) = ctx else {
            tracing::error!("PURGE reached the purge handler without a request context");
            return ProxyError::MissingContext.into_response();
        };

        let message = if self.is_bulk(ctx) {
            self.cache.purge_all().await;
            PURGED_ALL
        } else {
            self.cache.purge(ctx, ctx.lang.as_deref()).await;
            PURGED_ONE
        };

        (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            message,
        )
            .into_response()
    }
}

#[async_trait]
impl Stage for CachePurgeHandler {
    fn name(&self) -> &'static str {
        "purge"
    }

    async fn run(&self, exchange: &mut Exchange) -> Outcome {
        if !is_purge(&exchange.ctx.method) {
            return Outcome::Continue;
        }
        Outcome::Respond(self.handle(Some(&exchange.ctx)).await)
    }
}
