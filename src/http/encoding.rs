//! Content-Encoding codecs for bodies that must be rewritten.

use std::io::{Read, Write};

use bytes::Bytes;
use flate2::read::{DeflateDecoder, GzDecoder, ZlibDecoder};
use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::Compression;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("unsupported content encoding '{0}'")]
    Unsupported(String),

    #[error("codec failure: {0}")]
    Io(#[from] std::io::Error),
}

/// Codings the proxy can decode and re-encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentCoding {
    Identity,
    Gzip,
    Deflate,
}

impl ContentCoding {
    /// Parse a `Content-Encoding` value. Stacked codings are not supported.
    pub fn parse(value: Option<&str>) -> Result<Self, CodecError> {
        let Some(value) = value else {
            return Ok(ContentCoding::Identity);
        };
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "identity" => Ok(ContentCoding::Identity),
            "gzip" | "x-gzip" => Ok(ContentCoding::Gzip),
            "deflate" => Ok(ContentCoding::Deflate),
            _ => Err(CodecError::Unsupported(value.to_string())),
        }
    }
}

pub fn decompress(body: &[u8], coding: ContentCoding) -> Result<Bytes, CodecError> {
    let mut out = Vec::with_capacity(body.len() * 4);
    match coding {
        ContentCoding::Identity => return Ok(Bytes::copy_from_slice(body)),
        ContentCoding::Gzip => {
            GzDecoder::new(body).read_to_end(&mut out)?;
        }
        ContentCoding::Deflate => {
            // Some servers send raw deflate instead of the zlib wrapper.
            if ZlibDecoder::new(body).read_to_end(&mut out).is_err() {
                out.clear();
                DeflateDecoder::new(body).read_to_end(&mut out)?;
            }
        }
    }
    Ok(Bytes::from(out))
}

pub fn compress(body: &[u8], coding: ContentCoding) -> Result<Bytes, CodecError> {
    let compressed = match coding {
        ContentCoding::Identity => return Ok(Bytes::copy_from_slice(body)),
        ContentCoding::Gzip => {
            let mut encoder = GzEncoder::new(Vec::with_capacity(body.len()), Compression::default());
            encoder.write_all(body)?;
            encoder.finish()?
        }
        ContentCoding::Deflate => {
            let mut encoder = ZlibEncoder::new(Vec::with_capacity(body.len()), Compression::default());
            encoder.write_all(body)?;
            encoder.finish()?
        }
    };
    Ok(Bytes::from(compressed))
}

/// Keep only the `Accept-Encoding` entries that [`decompress`] handles.
/// `None` when nothing usable is left, which leaves the upstream to send
/// identity.
pub fn decodable_accept_encoding(value: &str) -> Option<String> {
    let kept: Vec<&str> = value
        .split(',')
        .map(str::trim)
        .filter(|entry| {
            let name = entry.split(';').next().unwrap_or("").trim();
            !name.is_empty() && ContentCoding::parse(Some(name)).is_ok()
        })
        .collect();
    (!kept.is_empty()).then(|| kept.join(", "))
}
