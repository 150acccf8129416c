//! Document tree seam and its html5ever implementation.
//!
//! The chunker only needs a handful of tree operations, so it is written
//! against [`DocumentTree`] rather than a parser's node API.

use std::rc::Rc;

use html5ever::serialize::{serialize, SerializeOpts, TraversalScope};
use html5ever::tendril::TendrilSink;
use html5ever::{parse_document, parse_fragment, LocalName, Namespace, ParseOpts, QualName};
use markup5ever_rcdom::{Handle, NodeData, RcDom, SerializableHandle};

const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

/// Elements whose content is never translated.
const OPAQUE_ELEMENTS: [&str; 4] = ["script", "style", "noscript", "template"];

/// Root selector: `tag`, `#id` or `.class`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Tag(String),
    Id(String),
    Class(String),
}

impl Selector {
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if let Some(id) = raw.strip_prefix('#') {
            return (!id.is_empty()).then(|| Selector::Id(id.to_string()));
        }
        if let Some(class) = raw.strip_prefix('.') {
            return (!class.is_empty()).then(|| Selector::Class(class.to_string()));
        }
        (!raw.is_empty()).then(|| Selector::Tag(raw.to_ascii_lowercase()))
    }
}

/// Operations the chunker and orchestrator perform on a parsed document.
pub trait DocumentTree {
    type Node: Clone;

    fn root(&self) -> Self::Node;

    fn matches(&self, node: &Self::Node, selector: &Selector) -> bool;

    /// Element children in document order, minus non-translatable elements.
    fn children(&self, node: &Self::Node) -> Vec<Self::Node>;

    /// Concatenated text of the node's own text children.
    fn direct_text(&self, node: &Self::Node) -> String;

    /// Concatenated text of the whole subtree, minus non-translatable elements.
    fn text_content(&self, node: &Self::Node) -> String;

    /// Outer markup of the node.
    fn serialize(&self, node: &Self::Node) -> String;

    /// Markup of the node's children.
    fn inner_content(&self, node: &Self::Node) -> String;

    /// Replace the node's children with parsed markup.
    fn set_inner_content(&self, node: &Self::Node, markup: &str);

    /// Markup of the whole document.
    fn serialize_whole(&self) -> String;
}

/// HTML document parsed with html5ever into an `RcDom`.
pub struct HtmlDocument {
    dom: RcDom,
}

impl HtmlDocument {
    pub fn parse(html: &str) -> Self {
        let dom = parse_document(RcDom::default(), ParseOpts::default()).one(html);
        Self { dom }
    }

    fn element_name(node: &Handle) -> Option<&str> {
        match &node.data {
            NodeData::Element { name, .. } => Some(&*name.local),
            _ => None,
        }
    }

    fn is_opaque(node: &Handle) -> bool {
        Self::element_name(node)
            .map(|name| OPAQUE_ELEMENTS.contains(&name))
            .unwrap_or(false)
    }

    fn attribute(node: &Handle, attr: &str) -> Option<String> {
        match &node.data {
            NodeData::Element { attrs, .. } => attrs
                .borrow()
                .iter()
                .find(|a| &*a.name.local == attr)
                .map(|a| a.value.to_string()),
            _ => None,
        }
    }

    fn collect_text(node: &Handle, out: &mut String) {
        for child in node.children.borrow().iter() {
            match &child.data {
                NodeData::Text { contents } => out.push_str(&contents.borrow()),
                NodeData::Element { .. } if !Self::is_opaque(child) => Self::collect_text(child, out),
                _ => {}
            }
        }
    }

    fn to_markup(node: &Handle, scope: TraversalScope) -> String {
        let mut out = Vec::new();
        let opts = SerializeOpts {
            traversal_scope: scope,
            ..Default::default()
        };
        let handle: SerializableHandle = node.clone().into();
        if let Err(e) = serialize(&mut out, &handle, opts) {
            tracing::warn!(error = %e, "Failed to serialize document node");
        }
        String::from_utf8_lossy(&out).into_owned()
    }
}

impl DocumentTree for HtmlDocument {
    type Node = Handle;

    fn root(&self) -> Handle {
        self.dom.document.clone()
    }

    fn matches(&self, node: &Handle, selector: &Selector) -> bool {
        match selector {
            Selector::Tag(tag) => Self::element_name(node)
                .map(|name| name.eq_ignore_ascii_case(tag))
                .unwrap_or(false),
            Selector::Id(id) => Self::attribute(node, "id").as_deref() == Some(id.as_str()),
            Selector::Class(class) => Self::attribute(node, "class")
                .map(|classes| classes.split_ascii_whitespace().any(|c| c == class))
                .unwrap_or(false),
        }
    }

    fn children(&self, node: &Handle) -> Vec<Handle> {
        node.children
            .borrow()
            .iter()
            .filter(|child| matches!(child.data, NodeData::Element { .. }) && !Self::is_opaque(child))
            .cloned()
            .collect()
    }

    fn direct_text(&self, node: &Handle) -> String {
        let mut out = String::new();
        for child in node.children.borrow().iter() {
            if let NodeData::Text { contents } = &child.data {
                out.push_str(&contents.borrow());
            }
        }
        out
    }

    fn text_content(&self, node: &Handle) -> String {
        let mut out = String::new();
        if !Self::is_opaque(node) {
            Self::collect_text(node, &mut out);
        }
        out
    }

    fn serialize(&self, node: &Handle) -> String {
        Self::to_markup(node, TraversalScope::IncludeNode)
    }

    fn inner_content(&self, node: &Handle) -> String {
        Self::to_markup(node, TraversalScope::ChildrenOnly(None))
    }

    fn set_inner_content(&self, node: &Handle, markup: &str) {
        let tag = Self::element_name(node).unwrap_or("div").to_string();
        let context = QualName::new(None, Namespace::from(HTML_NAMESPACE), LocalName::from(tag));
        let fragment = parse_fragment(RcDom::default(), ParseOpts::default(), context, vec![]).one(markup);

        // Fragment parsing yields document > html > parsed nodes.
        let container = fragment
            .document
            .children
            .borrow()
            .iter()
            .find(|c| matches!(c.data, NodeData::Element { .. }))
            .cloned();
        let new_children: Vec<Handle> = match container {
            Some(html) => html.children.borrow().clone(),
            None => Vec::new(),
        };

        for child in &new_children {
            child.parent.set(Some(Rc::downgrade(node)));
        }
        *node.children.borrow_mut() = new_children;
    }

    fn serialize_whole(&self) -> String {
        Self::to_markup(&self.dom.document, TraversalScope::ChildrenOnly(None))
    }
}

/// Depth-first search for selector matches. Matches are not searched
/// for nested matches.
pub fn find_roots<D: DocumentTree>(doc: &D, selectors: &[Selector]) -> Vec<D::Node> {
    fn walk<D: DocumentTree>(doc: &D, node: D::Node, selectors: &[Selector], out: &mut Vec<D::Node>) {
        if selectors.iter().any(|s| doc.matches(&node, s)) {
            out.push(node);
            return;
        }
        for child in doc.children(&node) {
            walk(doc, child, selectors, out);
        }
    }

    let mut roots = Vec::new();
    walk(doc, doc.root(), selectors, &mut roots);
    roots
}
