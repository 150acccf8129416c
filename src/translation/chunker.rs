//! Greedy, order-preserving split of a document into translation chunks.
//!
//! Sizes are measured on serialized outer markup. An element with its own
//! text is an atomic unit and is never split. An element without direct
//! text is kept whole when it fits, and broken into its children only
//! when it alone exceeds the limit.

use crate::translation::document::{find_roots, DocumentTree, Selector};

/// Ordered group of elements translated by one API call.
#[derive(Debug, Clone)]
pub struct TranslationChunk<N> {
    pub nodes: Vec<N>,
    /// Sum of the nodes' serialized sizes.
    pub size: usize,
}

impl<N> TranslationChunk<N> {
    fn new() -> Self {
        Self {
            nodes: Vec::new(),
            size: 0,
        }
    }

    fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct DocumentChunker {
    limit: usize,
    selectors: Vec<Selector>,
}

impl DocumentChunker {
    pub fn new(limit: usize, selectors: Vec<Selector>) -> Self {
        Self { limit, selectors }
    }

    /// Build from raw selector strings, dropping ones that do not parse.
    pub fn from_config(limit: usize, selectors: &[String]) -> Self {
        let parsed = selectors
            .iter()
            .filter_map(|raw| {
                let parsed = Selector::parse(raw);
                if parsed.is_none() {
                    tracing::warn!(selector = %raw, "Ignoring invalid translation root selector");
                }
                parsed
            })
            .collect();
        Self::new(limit, parsed)
    }

    pub fn chunk<D: DocumentTree>(&self, doc: &D) -> Vec<TranslationChunk<D::Node>> {
        let mut pass = Pass {
            doc,
            limit: self.limit,
            current: TranslationChunk::new(),
            chunks: Vec::new(),
        };

        for root in find_roots(doc, &self.selectors) {
            if has_text(&doc.direct_text(&root)) {
                pass.atomic(root);
            } else {
                for child in doc.children(&root) {
                    pass.visit(child);
                }
            }
            pass.flush();
        }
        pass.chunks
    }
}

fn has_text(text: &str) -> bool {
    !text.trim().is_empty()
}

struct Pass<'a, D: DocumentTree> {
    doc: &'a D,
    limit: usize,
    current: TranslationChunk<D::Node>,
    chunks: Vec<TranslationChunk<D::Node>>,
}

impl<D: DocumentTree> Pass<'_, D> {
    fn flush(&mut self) {
        if !self.current.is_empty() {
            let chunk = std::mem::replace(&mut self.current, TranslationChunk::new());
            self.chunks.push(chunk);
        }
    }

    fn push(&mut self, node: D::Node, size: usize) {
        self.current.nodes.push(node);
        self.current.size += size;
    }

    fn overflows(&self, size: usize) -> bool {
        self.current.size + size > self.limit
    }

    fn atomic(&mut self, node: D::Node) {
        let size = self.doc.serialize(&node).len();
        if !self.current.is_empty() && self.overflows(size) {
            self.flush();
        }
        self.push(node, size);
    }

    fn visit(&mut self, node: D::Node) {
        if !has_text(&self.doc.text_content(&node)) {
            return;
        }
        if has_text(&self.doc.direct_text(&node)) {
            self.atomic(node);
            return;
        }

        let size = self.doc.serialize(&node).len();
        if !self.overflows(size) {
            self.push(node, size);
        } else if size > self.limit {
            for child in self.doc.children(&node) {
                self.visit(child);
            }
        } else {
            self.flush();
            self.push(node, size);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translation::document::HtmlDocument;

    fn body_chunker(limit: usize) -> DocumentChunker {
        DocumentChunker::from_config(limit, &["body".to_string()])
    }

    fn squash(text: &str) -> String {
        text.chars().filter(|c| !c.is_whitespace()).collect()
    }

    fn sample_page() -> String {
        let mut html = String::from("<html><body><h1>Title of the page</h1>");
        for section in 0..4 {
            html.push_str("<section><div>");
            for p in 0..5 {
                html.push_str(&format!("<p>Section {} paragraph {} with <i>some</i> words.</p>", section, p));
            }
            html.push_str("</div><ul>");
            for item in 0..3 {
                html.push_str(&format!("<li>item {}-{}</li>", section, item));
            }
            html.push_str("</ul><div>   </div></section>");
        }
        html.push_str("<p>A single paragraph that is deliberately much longer than the smallest limits tried below.</p>");
        html.push_str("<script>ignored()</script></body></html>");
        html
    }

    #[test]
    fn chunks_preserve_text_order_for_every_limit() {
        let html = sample_page();
        let doc = HtmlDocument::parse(&html);
        let body = find_roots(&doc, &[Selector::Tag("body".into())]).remove(0);
        let expected = squash(&doc.text_content(&body));

        for limit in [1, 16, 64, 100, 250, 512, 1024, 4096, 1 << 20] {
            let chunks = body_chunker(limit).chunk(&doc);
            let joined: String = chunks
                .iter()
                .flat_map(|c| c.nodes.iter())
                .map(|n| doc.text_content(n))
                .collect();
            assert_eq!(squash(&joined), expected, "limit {}", limit);
        }
    }

    #[test]
    fn chunks_respect_the_limit_unless_single_atomic() {
        let html = sample_page();
        let doc = HtmlDocument::parse(&html);

        for limit in [1, 16, 64, 100, 250, 512, 1024, 4096] {
            for chunk in body_chunker(limit).chunk(&doc) {
                let measured: usize = chunk.nodes.iter().map(|n| doc.serialize(n).len()).sum();
                assert_eq!(measured, chunk.size);
                if chunk.size > limit {
                    assert_eq!(chunk.nodes.len(), 1, "limit {}", limit);
                    assert!(has_text(&doc.direct_text(&chunk.nodes[0])));
                }
            }
        }
    }

    #[test]
    fn large_limit_keeps_children_whole() {
        let doc = HtmlDocument::parse(&sample_page());
        let chunks = body_chunker(1 << 20).chunk(&doc);
        assert_eq!(chunks.len(), 1);
        // h1, four sections, trailing paragraph.
        assert_eq!(chunks[0].nodes.len(), 6);
    }

    #[test]
    fn whitespace_only_subtrees_are_skipped() {
        let doc = HtmlDocument::parse("<html><body><div> <span>  </span> </div><p>x</p></body></html>");
        let chunks = body_chunker(1024).chunk(&doc);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].nodes.len(), 1);
        assert_eq!(doc.serialize(&chunks[0].nodes[0]), "<p>x</p>");
    }

    #[test]
    fn root_with_direct_text_is_one_unit() {
        let doc = HtmlDocument::parse("<html><body>Plain <b>text</b></body></html>");
        let chunks = body_chunker(4).chunk(&doc);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].nodes.len(), 1);
    }

    #[test]
    fn each_root_is_flushed_separately() {
        let doc = HtmlDocument::parse(
            "<html><body><div class=\"t\"><p>a</p></div><p>skip</p><div class=\"t\"><p>b</p></div></body></html>",
        );
        let chunker = DocumentChunker::from_config(1024, &[".t".to_string(), "#".to_string()]);
        let chunks = chunker.chunk(&doc);
        assert_eq!(chunks.len(), 2);
        assert_eq!(doc.text_content(&chunks[0].nodes[0]), "a");
        assert_eq!(doc.text_content(&chunks[1].nodes[0]), "b");
    }

    #[test]
    fn no_roots_means_no_chunks() {
        let doc = HtmlDocument::parse("<html><body><p>x</p></body></html>");
        let chunker = DocumentChunker::from_config(1024, &["#missing".to_string()]);
        assert!(chunker.chunk(&doc).is_empty());
    }
}
