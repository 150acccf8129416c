//! Drives chunking and the API client for one document.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{stream, StreamExt, TryStreamExt};

use crate::config::TranslationConfig;
use crate::observability::metrics;
use crate::translation::chunker::DocumentChunker;
use crate::translation::client::{TranslateRequest, TranslationClient};
use crate::translation::document::{DocumentTree, HtmlDocument};
use crate::translation::TranslationError;

pub struct TranslationOrchestrator {
    client: Arc<dyn TranslationClient>,
    chunker: DocumentChunker,
    source_lang: String,
    max_page_size: usize,
    timeout: Duration,
    deadline: Duration,
    max_concurrency: usize,
}

impl TranslationOrchestrator {
    pub fn new(client: Arc<dyn TranslationClient>, config: &TranslationConfig) -> Self {
        Self {
            client,
            chunker: DocumentChunker::from_config(config.chunk_size, &config.root_selectors),
            source_lang: config.source_lang.clone(),
            max_page_size: config.max_page_size,
            timeout: Duration::from_secs(config.timeout_secs),
            deadline: Duration::from_secs(config.deadline_secs),
            max_concurrency: config.max_concurrency.max(1),
        }
    }

    /// Cap the whole-document deadline, keeping the configured one when it
    /// is already shorter.
    pub fn with_deadline_cap(mut self, cap: Duration) -> Self {
        self.deadline = self.deadline.min(cap);
        self
    }

    /// Translate a whole document into `lang`.
    pub async fn translate(&self, html: &str, lang: &str) -> Result<String, TranslationError> {
        if html.len() > self.max_page_size {
            metrics::record_translation("too_large");
            return Err(TranslationError::TooLargePage {
                size: html.len(),
                limit: self.max_page_size,
            });
        }

        let queries = self.plan(html);
        if queries.is_empty() {
            tracing::debug!(lang, "Nothing to translate");
            return Ok(html.to_string());
        }

        let started = std::time::Instant::now();
        let chunk_count = queries.len();
        let calls = stream::iter(
            queries
                .into_iter()
                .enumerate()
                .map(|(index, q)| self.translate_chunk(index, q, lang)),
        )
        .buffered(self.max_concurrency)
        .try_collect::<Vec<_>>();

        let result = match tokio::time::timeout(self.deadline, calls).await {
            Ok(result) => result,
            Err(_) => Err(TranslationError::Failed(format!(
                "{} chunks not translated within {}ms",
                chunk_count,
                self.deadline.as_millis()
            ))),
        };

        let translations = match result {
            Ok(translations) => translations,
            Err(e) => {
                metrics::record_translation("failed");
                return Err(e);
            }
        };

        let translated = self.apply(html, translations)?;
        tracing::info!(
            lang,
            chunks = chunk_count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Document translated"
        );
        metrics::record_translation("success");
        Ok(translated)
    }

    /// Inner markup of every chunked element, grouped per chunk.
    fn plan(&self, html: &str) -> Vec<Vec<String>> {
        let doc = HtmlDocument::parse(html);
        self.chunker
            .chunk(&doc)
            .iter()
            .map(|chunk| chunk.nodes.iter().map(|n| doc.inner_content(n)).collect())
            .collect()
    }

    /// Re-chunk a fresh parse and write the translations in, chunk by
    /// chunk and element by element.
    fn apply(&self, html: &str, translations: Vec<Vec<String>>) -> Result<String, TranslationError> {
        let doc = HtmlDocument::parse(html);
        let chunks = self.chunker.chunk(&doc);
        if chunks.len() != translations.len() {
            return Err(TranslationError::Document(format!(
                "re-parse produced {} chunks, expected {}",
                chunks.len(),
                translations.len()
            )));
        }

        for (chunk, translated) in chunks.iter().zip(translations) {
            if chunk.nodes.len() != translated.len() {
                return Err(TranslationError::Document(
                    "re-parse produced a different chunk layout".into(),
                ));
            }
            for (node, text) in chunk.nodes.iter().zip(translated) {
                doc.set_inner_content(node, &text);
            }
        }
        Ok(doc.serialize_whole())
    }

    async fn translate_chunk(
        &self,
        index: usize,
        q: Vec<String>,
        lang: &str,
    ) -> Result<Vec<String>, TranslationError> {
        let expected = q.len();
        let request = TranslateRequest::html(q, &self.source_lang, lang);

        let translated = tokio::time::timeout(self.timeout, self.client.translate(request))
            .await
            .map_err(|_| {
                TranslationError::Failed(format!(
                    "chunk {} timed out after {}s",
                    index,
                    self.timeout.as_secs()
                ))
            })??;

        if translated.len() != expected {
            return Err(TranslationError::Failed(format!(
                "chunk {} returned {} segments for {}",
                index,
                translated.len(),
                expected
            )));
        }
        tracing::debug!(chunk = index, segments = expected, "Chunk translated");
        Ok(translated)
    }
}
