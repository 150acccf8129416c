//! Response emission.
//!
//! # Responsibilities
//! - Write a buffered body with its cached or captured head
//! - Answer conditional requests with 304
//! - Decode, translate, re-encode and cache HTML for a requested language
//!
//! # Design Decisions
//! - Hop-by-hop headers never leave the proxy
//! - Content-Length always matches the bytes actually sent, except for
//!   bodiless HEAD answers which keep the upstream value
//! - A failed translation still answers 200 with the original page and a
//!   visible notice; it is never cached

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, HeaderValue, StatusCode},
    response::Response,
};
use bytes::Bytes;

use crate::cache::{ResponseCache, ResponseMetadata};
use crate::http::encoding::{compress, decompress, ContentCoding};
use crate::http::request::RequestContext;
use crate::security::headers::strip_hop_by_hop;
use crate::translation::notice::inject_notice;
use crate::translation::TranslationOrchestrator;

pub const SELECTED_LANG_COOKIE: &str = "SELECTEDLANG";

#[derive(Clone)]
pub struct ResponseDispatcher {
    cache: ResponseCache,
    orchestrator: Arc<TranslationOrchestrator>,
}

impl ResponseDispatcher {
    pub fn new(cache: ResponseCache, orchestrator: Arc<TranslationOrchestrator>) -> Self {
        Self {
            cache,
            orchestrator,
        }
    }

    /// Write status, headers and body as given.
    pub fn send_buffer(&self, metadata: &ResponseMetadata, body: Bytes) -> Response {
        let mut headers = metadata.header_map();
        strip_hop_by_hop(&mut headers);
        if !(body.is_empty() && headers.contains_key(header::CONTENT_LENGTH)) {
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));
        }

        let mut response = Response::new(Body::from(body));
        *response.status_mut() = metadata.status();
        *response.headers_mut() = headers;
        response
    }

    /// 304 with the cached head and no body.
    pub fn send_not_modified(&self, metadata: &ResponseMetadata) -> Response {
        let mut headers = metadata.header_map();
        strip_hop_by_hop(&mut headers);
        headers.remove(header::CONTENT_LENGTH);

        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NOT_MODIFIED;
        *response.headers_mut() = headers;
        response
    }

    /// Translate an HTML body into the request's language and send it.
    ///
    /// Bodies that cannot be decoded are sent untouched.
    pub async fn send_translation(
        &self,
        raw: Bytes,
        ctx: &RequestContext,
        metadata: &ResponseMetadata,
    ) -> Response {
        let Some(lang) = ctx.lang.as_deref() else {
            return self.send_buffer(metadata, raw);
        };

        let coding = match ContentCoding::parse(metadata.content_encoding.as_deref()) {
            Ok(coding) => coding,
            Err(e) => {
                tracing::warn!(request_id = %ctx.id, error = %e, "Serving untranslated body");
                return self.send_buffer(metadata, raw);
            }
        };
        let decoded = match decompress(&raw, coding) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::warn!(request_id = %ctx.id, error = %e, "Cannot decode body for translation");
                return self.send_buffer(metadata, raw);
            }
        };
        let html = match std::str::from_utf8(&decoded) {
            Ok(html) => html,
            Err(e) => {
                tracing::warn!(request_id = %ctx.id, error = %e, "Body is not UTF-8, serving untranslated");
                return self.send_buffer(metadata, raw);
            }
        };

        let mut translated_meta = metadata.clone();
        translated_meta.lang = Some(lang.to_string());
        translated_meta.remove_header(header::TRANSFER_ENCODING.as_str());
        translated_meta.set_header(
            header::ACCESS_CONTROL_ALLOW_ORIGIN.as_str(),
            ctx.requested_host.clone(),
        );

        let (document, translated) = match self.orchestrator.translate(html, lang).await {
            Ok(document) => (document, true),
            Err(err) => {
                tracing::warn!(
                    request_id = %ctx.id,
                    href = %ctx.href,
                    lang,
                    kind = err.kind(),
                    error = %err,
                    "Translation failed, serving original with notice"
                );
                (inject_notice(html, &err), false)
            }
        };

        let body = match compress(document.as_bytes(), coding) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(request_id = %ctx.id, error = %e, "Cannot re-encode translated body");
                return self.send_buffer(metadata, raw);
            }
        };
        translated_meta.set_header(header::CONTENT_LENGTH.as_str(), body.len().to_string());

        if translated {
            translated_meta.append_header(
                header::SET_COOKIE.as_str(),
                format!("{}={}", SELECTED_LANG_COOKIE, lang),
            );
            self.cache.save(ctx, Some(lang), &translated_meta, &body).await;
        } else {
            translated_meta.set_status(StatusCode::OK);
        }

        self.send_buffer(&translated_meta, body)
    }
}
