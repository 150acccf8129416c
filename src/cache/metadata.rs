//! Cached response head and body.

use axum::http::{response::Parts, HeaderMap, HeaderName, HeaderValue, StatusCode};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::security::headers::HOP_BY_HOP;

/// Response head captured once per upstream response.
///
/// Header names are stored lowercase; repeated headers (e.g. `set-cookie`)
/// keep one entry per value, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub status_code: u16,
    pub status_message: String,
    /// Language this instance represents, `None` for the original.
    pub lang: Option<String>,
    pub href: String,
    pub content_encoding: Option<String>,
    pub headers: Vec<(String, String)>,
}

impl ResponseMetadata {
    pub fn new(status: StatusCode, href: impl Into<String>) -> Self {
        Self {
            status_code: status.as_u16(),
            status_message: status.canonical_reason().unwrap_or("").to_string(),
            lang: None,
            href: href.into(),
            content_encoding: None,
            headers: Vec::new(),
        }
    }

    /// Capture an upstream response head, dropping hop-by-hop headers.
    pub fn from_response(parts: &Parts, href: impl Into<String>) -> Self {
        let mut metadata = Self::new(parts.status, href);
        metadata.headers = parts
            .headers
            .iter()
            .filter(|(name, _)| !HOP_BY_HOP.contains(&name.as_str()))
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        metadata.content_encoding = metadata.header("content-encoding").map(str::to_string);
        metadata
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status_code = status.as_u16();
        self.status_message = status.canonical_reason().unwrap_or("").to_string();
    }

    /// First value of a header, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Replace every value of a header with a single one.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.remove_header(name);
        self.headers.push((name.to_ascii_lowercase(), value.into()));
    }

    /// Add a value without touching existing ones.
    pub fn append_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.push((name.to_ascii_lowercase(), value.into()));
    }

    pub fn remove_header(&mut self, name: &str) {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    pub fn is_html(&self) -> bool {
        self.content_type()
            .map(|ct| ct.to_ascii_lowercase().contains("text/html"))
            .unwrap_or(false)
    }

    pub fn etag(&self) -> Option<&str> {
        self.header("etag")
    }

    pub fn last_modified(&self) -> Option<&str> {
        self.header("last-modified")
    }

    /// Headers as an `http` map; entries that are not valid header
    /// syntax are skipped.
    pub fn header_map(&self) -> HeaderMap {
        let mut map = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                map.append(name, value);
            }
        }
        map
    }
}

/// One cached response variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub metadata: ResponseMetadata,
    pub body: Bytes,
}
