//! In-memory document model for pages that are inspected without a rendering
//! engine. Nodes live in an arena in document order so selector matching can
//! walk parents and siblings cheaply.

pub mod behavior;
pub mod selector;

use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use html5ever::tree_builder::TreeBuilderOpts;
use html5ever::ParseOpts;
use markup5ever_rcdom::{Handle, NodeData, RcDom};
use std::collections::HashMap;

pub use selector::{SelectorError, SelectorList};

/// Index of a node inside its [`Document`].
pub type NodeId = usize;

/// Tags that never render, whatever their styles say.
const NON_RENDERED: &[&str] = &["head", "script", "style", "template", "title", "meta", "link"];

#[derive(Debug, Clone)]
pub struct Node {
    pub tag: String,
    pub attributes: HashMap<String, String>,
    pub text: String,
    pub children: Vec<NodeId>,
    pub parent: Option<NodeId>,
    pub node_type: NodeType,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeType {
    Element,
    Text,
    Document,
}

impl Node {
    fn new(node_type: NodeType, tag: &str, text: &str, parent: Option<NodeId>) -> Self {
        Self {
            tag: tag.to_string(),
            attributes: HashMap::new(),
            text: text.to_string(),
            children: Vec::new(),
            parent,
            node_type,
        }
    }

    pub fn get_attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(|s| s.as_str())
    }

    pub fn is_element(&self) -> bool {
        self.node_type == NodeType::Element
    }
}

/// A parsed page. Node 0 is always the document root.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
}

impl Document {
    /// Parse an HTML string into a document arena.
    pub fn parse(html: &str) -> Self {
        let opts = ParseOpts {
            tree_builder: TreeBuilderOpts {
                drop_doctype: true,
                ..Default::default()
            },
            ..Default::default()
        };

        // Reading from an in-memory slice cannot fail; fall back to an empty tree anyway.
        let dom = parse_document(RcDom::default(), opts)
            .from_utf8()
            .read_from(&mut html.as_bytes())
            .unwrap_or_default();

        let mut doc = Document {
            nodes: vec![Node::new(NodeType::Document, "", "", None)],
        };
        for child in dom.document.children.borrow().iter() {
            doc.convert(child, 0);
        }
        doc
    }

    fn convert(&mut self, handle: &Handle, parent: NodeId) {
        match &handle.data {
            NodeData::Element { name, attrs, .. } => {
                let tag = name.local.to_string();
                let id = self.nodes.len();
                let mut node = Node::new(NodeType::Element, &tag, "", Some(parent));
                for attr in attrs.borrow().iter() {
                    node.attributes
                        .insert(attr.name.local.to_string(), attr.value.to_string());
                }
                self.nodes.push(node);
                self.nodes[parent].children.push(id);

                // Script and style bodies carry no page text
                if tag == "script" || tag == "style" {
                    return;
                }
                for child in handle.children.borrow().iter() {
                    self.convert(child, id);
                }
            }
            NodeData::Text { contents } => {
                let text = contents.borrow().to_string();
                if text.trim().is_empty() {
                    return;
                }
                let id = self.nodes.len();
                self.nodes.push(Node::new(NodeType::Text, "", &text, Some(parent)));
                self.nodes[parent].children.push(id);
            }
            _ => {} // Comments, PIs, doctypes
        }
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn get_attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.nodes.get(id).and_then(|n| n.get_attr(name))
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.attributes.insert(name.to_string(), value.to_string());
        }
    }

    /// All element ids in document order.
    pub fn elements(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_element())
            .map(|(id, _)| id)
    }

    pub fn element_children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes[id]
            .children
            .iter()
            .copied()
            .filter(|&c| self.nodes[c].is_element())
    }

    /// Parent element, `None` at the top of the tree.
    pub fn parent_element(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.nodes[id].parent?;
        self.nodes[parent].is_element().then_some(parent)
    }

    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            doc: self,
            next: self.parent_element(id),
        }
    }

    pub fn is_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        self.ancestors(id).any(|a| a == ancestor)
    }

    /// Element descendants of `id` in document order.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.element_children(id).collect();
        stack.reverse();
        while let Some(next) = stack.pop() {
            out.push(next);
            let mut kids: Vec<NodeId> = self.element_children(next).collect();
            kids.reverse();
            stack.extend(kids);
        }
        out
    }

    pub fn closest(&self, id: NodeId, pred: impl Fn(&Node) -> bool) -> Option<NodeId> {
        if pred(&self.nodes[id]) {
            return Some(id);
        }
        self.ancestors(id).find(|&a| pred(&self.nodes[a]))
    }

    pub fn find_by_id(&self, dom_id: &str) -> Option<NodeId> {
        self.elements().find(|&e| self.get_attr(e, "id") == Some(dom_id))
    }

    /// Elements matching the selector list, document order, no duplicates.
    pub fn select(&self, selectors: &SelectorList) -> Vec<NodeId> {
        self.elements()
            .filter(|&id| selectors.matches(self, id))
            .collect()
    }

    /// Visible text of an element: descendant text joined by single spaces,
    /// skipping hidden subtrees.
    pub fn text_of(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out.trim().to_string()
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        let node = &self.nodes[id];
        match node.node_type {
            NodeType::Text => {
                let trimmed = node.text.split_whitespace().collect::<Vec<_>>().join(" ");
                if !trimmed.is_empty() {
                    if !out.is_empty() && !out.ends_with(' ') {
                        out.push(' ');
                    }
                    out.push_str(&trimmed);
                }
            }
            _ => {
                for &child in &node.children {
                    if self.nodes[child].is_element() && self.hides_itself(child) {
                        continue;
                    }
                    self.collect_text(child, out);
                }
            }
        }
    }

    /// Whether the element itself (ignoring ancestors) is hidden.
    fn hides_itself(&self, id: NodeId) -> bool {
        let node = &self.nodes[id];
        if NON_RENDERED.contains(&node.tag.as_str()) || node.attributes.contains_key("hidden") {
            return true;
        }
        node.get_attr("style")
            .map(|style| {
                let compact: String = style
                    .chars()
                    .filter(|c| !c.is_whitespace())
                    .collect::<String>()
                    .to_lowercase();
                compact.contains("display:none") || compact.contains("visibility:hidden")
            })
            .unwrap_or(false)
    }

    pub fn is_visible(&self, id: NodeId) -> bool {
        if !self.nodes[id].is_element() || self.hides_itself(id) {
            return false;
        }
        !self.ancestors(id).any(|a| self.hides_itself(a))
    }

    pub fn is_enabled(&self, id: NodeId) -> bool {
        !self.nodes[id].attributes.contains_key("disabled")
    }

    /// Show or hide an element by toggling the `hidden` attribute and
    /// clearing inline hiding styles.
    pub fn set_hidden(&mut self, id: NodeId, hidden: bool) {
        let node = &mut self.nodes[id];
        if hidden {
            node.attributes.insert("hidden".to_string(), String::new());
            return;
        }
        node.attributes.remove("hidden");
        if let Some(style) = node.attributes.get("style") {
            let kept: Vec<&str> = style
                .split(';')
                .filter(|decl| {
                    let compact: String = decl
                        .chars()
                        .filter(|c| !c.is_whitespace())
                        .collect::<String>()
                        .to_lowercase();
                    compact != "display:none" && compact != "visibility:hidden"
                })
                .filter(|decl| !decl.trim().is_empty())
                .collect();
            let rebuilt = kept.join(";");
            node.attributes.insert("style".to_string(), rebuilt);
        }
    }

    /// 1-based position among element siblings with the same tag.
    pub fn position_of_type(&self, id: NodeId) -> usize {
        let tag = &self.nodes[id].tag;
        match self.nodes[id].parent {
            Some(parent) => self
                .element_children(parent)
                .filter(|&s| &self.nodes[s].tag == tag)
                .position(|s| s == id)
                .map(|p| p + 1)
                .unwrap_or(1),
            None => 1,
        }
    }

    /// 1-based position among all element siblings.
    pub fn position_in_parent(&self, id: NodeId) -> usize {
        match self.nodes[id].parent {
            Some(parent) => self
                .element_children(parent)
                .position(|s| s == id)
                .map(|p| p + 1)
                .unwrap_or(1),
            None => 1,
        }
    }
}

pub struct Ancestors<'a> {
    doc: &'a Document,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.doc.parent_element(current);
        Some(current)
    }
}
