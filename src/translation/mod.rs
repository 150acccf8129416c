//! Document translation subsystem.
//!
//! # Data Flow
//! ```text
//! decoded HTML
//!     → orchestrator.rs (size gate)
//!     → document.rs (html5ever parse behind the DocumentTree seam)
//!     → chunker.rs (size-bounded, ordered chunks of elements)
//!     → client.rs (one API call per chunk, bounded concurrency)
//!     → document.rs (replace inner content, serialize)
//!     → translated HTML, or TranslationError
//!
//! notice.rs turns a TranslationError into an inline notice on the original page.
//! ```
//!
//! # Design Decisions
//! - The parsed tree never lives across an await: the document is parsed
//!   once to plan the calls and again to apply the results
//! - Any failed chunk discards the whole translation

pub mod chunker;
pub mod client;
pub mod document;
pub mod notice;
pub mod orchestrator;

use thiserror::Error;

pub use chunker::{DocumentChunker, TranslationChunk};
pub use client::{GoogleTranslateClient, TranslateRequest, TranslationClient};
pub use document::{DocumentTree, HtmlDocument, Selector};
pub use orchestrator::TranslationOrchestrator;

#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("page is {size} bytes, translation limit is {limit}")]
    TooLargePage { size: usize, limit: usize },

    #[error("translation failed: {0}")]
    Failed(String),

    #[error("document error: {0}")]
    Document(String),
}

impl TranslationError {
    /// Label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            TranslationError::TooLargePage { .. } => "too_large",
            TranslationError::Failed(_) => "failed",
            TranslationError::Document(_) => "document",
        }
    }
}
