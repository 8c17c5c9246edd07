use std::fmt::{self, Write};

use crate::dom::{
    BLOCK_ATTR, DomSelection, DomTree, MutationFeed, MutationRecord, NodeId, OFFSET_KEY_ATTR,
    TEXT_ATTR,
};
use crate::model::block::BlockKey;
use crate::offset_key::OffsetKey;

#[derive(Debug, Clone)]
enum NodeData {
    Element {
        tag: String,
        attributes: Vec<(String, String)>,
    },
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    data: NodeData,
}

/// Arena-backed DOM for tests and trace replay.
///
/// Nodes are never freed: a removed node stays in the arena, detached,
/// so mutation records can still point at it. While observing, every
/// structural or character-data change under the observed root is
/// recorded the way a browser `MutationObserver` would report it.
#[derive(Debug, Clone)]
pub struct MemoryDom {
    nodes: Vec<Node>,
    root: NodeId,
    selection: Option<DomSelection>,
    observed: Option<NodeId>,
    records: Vec<MutationRecord>,
}

impl Default for MemoryDom {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDom {
    /// An empty `<div contenteditable="true">`.
    pub fn new() -> Self {
        let mut dom = Self {
            nodes: Vec::new(),
            root: NodeId(0),
            selection: None,
            observed: None,
            records: Vec::new(),
        };
        dom.root = dom.create_element("div", &[("contenteditable", "true")]);
        dom
    }

    fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0 as usize]
    }

    fn alloc(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            parent: None,
            children: Vec::new(),
            data,
        });
        id
    }

    pub fn create_element(&mut self, tag: &str, attributes: &[(&str, &str)]) -> NodeId {
        self.alloc(NodeData::Element {
            tag: tag.to_ascii_lowercase(),
            attributes: attributes
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
        })
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.alloc(NodeData::Text(text.to_string()))
    }

    /// Attributes are not observed, so this never records a mutation.
    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) {
        if let NodeData::Element { attributes, .. } = &mut self.node_mut(node).data {
            match attributes.iter_mut().find(|(n, _)| n == name) {
                Some(slot) => slot.1 = value.to_string(),
                None => attributes.push((name.to_string(), value.to_string())),
            }
        }
    }

    fn record(&mut self, record: MutationRecord) {
        let Some(observed) = self.observed else {
            return;
        };
        if self.is_within(record.target, observed) {
            log::trace!("mutation {:?} on {:?}", record.kind, record.target);
            self.records.push(record);
        }
    }

    fn detach(&mut self, child: NodeId) {
        if let Some(parent) = self.node(child).parent {
            self.node_mut(parent).children.retain(|&c| c != child);
            self.node_mut(child).parent = None;
            self.record(MutationRecord::child_list(parent, Vec::new(), vec![child]));
        }
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.insert_before(parent, child, None);
    }

    /// Inserts `child` before `reference`, or last when `reference` is
    /// `None` or not a child of `parent`.
    pub fn insert_before(&mut self, parent: NodeId, child: NodeId, reference: Option<NodeId>) {
        self.detach(child);
        let index = reference
            .and_then(|r| self.node(parent).children.iter().position(|&c| c == r))
            .unwrap_or(self.node(parent).children.len());
        self.node_mut(parent).children.insert(index, child);
        self.node_mut(child).parent = Some(parent);
        self.record(MutationRecord::child_list(parent, vec![child], Vec::new()));
    }

    /// Detaches `node` from its parent, if it has one.
    pub fn remove(&mut self, node: NodeId) {
        self.detach(node);
    }

    /// Swaps every child of `parent` for `children`, reported as one record.
    pub fn replace_children(&mut self, parent: NodeId, children: Vec<NodeId>) {
        let removed = std::mem::take(&mut self.node_mut(parent).children);
        for &old in &removed {
            self.node_mut(old).parent = None;
        }
        for &child in &children {
            if let Some(previous) = self.node(child).parent {
                self.node_mut(previous).children.retain(|&c| c != child);
            }
            self.node_mut(child).parent = Some(parent);
        }
        self.node_mut(parent).children = children.clone();
        self.record(MutationRecord::child_list(parent, children, removed));
    }

    pub fn set_text(&mut self, node: NodeId, text: &str) {
        if let NodeData::Text(data) = &mut self.node_mut(node).data {
            if data == text {
                return;
            }
            *data = text.to_string();
            self.record(MutationRecord::character_data(node));
        }
    }

    /// Splits a text node at char `offset` the way `Text.splitText` does;
    /// returns the new node holding the tail.
    pub fn split_text(&mut self, node: NodeId, offset: usize) -> Option<NodeId> {
        let text = self.text(node)?.to_string();
        let at = text.char_indices().nth(offset).map_or(text.len(), |(i, _)| i);
        let tail = self.create_text(&text[at..]);
        let parent = self.parent(node);
        let next = self.next_sibling(node);
        self.set_text(node, &text[..at]);
        if let Some(parent) = parent {
            self.insert_before(parent, tail, next);
        }
        Some(tail)
    }

    pub fn set_selection(&mut self, selection: Option<DomSelection>) {
        self.selection = selection;
    }

    /// Every node attached under `from`, in document order.
    pub fn descendants(&self, from: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.node(id).children.iter().rev());
        }
        out
    }

    /// The leaf element rendered for `key`.
    pub fn find_leaf(&self, key: &OffsetKey) -> Option<NodeId> {
        let encoded = key.encode();
        self.descendants(self.root).into_iter().find(|&id| {
            self.attribute(id, OFFSET_KEY_ATTR) == Some(encoded.as_str())
                && self.attribute(id, BLOCK_ATTR).is_none()
        })
    }

    /// The block root rendered for `key`.
    pub fn find_block(&self, key: &BlockKey) -> Option<NodeId> {
        let encoded = OffsetKey::for_block(key.clone()).encode();
        self.descendants(self.root).into_iter().find(|&id| {
            self.attribute(id, BLOCK_ATTR) == Some("true")
                && self.attribute(id, OFFSET_KEY_ATTR) == Some(encoded.as_str())
        })
    }

    /// First text node under `node`.
    pub fn first_text(&self, node: NodeId) -> Option<NodeId> {
        self.descendants(node).into_iter().find(|&id| self.is_text(id))
    }

    /// Emulates native typing into a leaf: rewrites its text node, or
    /// swaps the empty-leaf placeholder for a text span. Returns the text
    /// node now holding the leaf's text.
    pub fn set_leaf_text(&mut self, key: &OffsetKey, text: &str) -> Option<NodeId> {
        let leaf = self.find_leaf(key)?;
        if let Some(node) = self.first_text(leaf) {
            self.set_text(node, text);
            return Some(node);
        }
        let node = self.create_text(text);
        let span = self.create_element("span", &[(TEXT_ATTR, "true")]);
        self.append_child(span, node);
        self.replace_children(leaf, vec![span]);
        Some(node)
    }

    /// Serializes the subtree under `node` (inclusive).
    pub fn to_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.write_html(node, &mut out);
        out
    }

    fn write_html(&self, id: NodeId, out: &mut String) {
        match &self.node(id).data {
            NodeData::Text(text) => out.push_str(&html_escape::encode_text(text)),
            NodeData::Element { tag, attributes } => {
                let _ = write!(out, "<{tag}");
                for (name, value) in attributes {
                    let _ = write!(
                        out,
                        " {name}=\"{}\"",
                        html_escape::encode_double_quoted_attribute(value)
                    );
                }
                out.push('>');
                if tag == "br" {
                    return;
                }
                for &child in &self.node(id).children {
                    self.write_html(child, out);
                }
                let _ = write!(out, "</{tag}>");
            }
        }
    }

    /// Serializes the editable root's children.
    pub fn inner_html(&self) -> String {
        let mut out = String::new();
        for &child in &self.node(self.root).children {
            self.write_html(child, &mut out);
        }
        out
    }
}

impl fmt::Display for MemoryDom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_html(self.root))
    }
}

impl DomTree for MemoryDom {
    fn root(&self) -> NodeId {
        self.root
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.node(node).parent
    }

    fn children(&self, node: NodeId) -> &[NodeId] {
        &self.node(node).children
    }

    fn tag_name(&self, node: NodeId) -> Option<&str> {
        match &self.node(node).data {
            NodeData::Element { tag, .. } => Some(tag),
            NodeData::Text(_) => None,
        }
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        match &self.node(node).data {
            NodeData::Element { attributes, .. } => attributes
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, value)| value.as_str()),
            NodeData::Text(_) => None,
        }
    }

    fn text(&self, node: NodeId) -> Option<&str> {
        match &self.node(node).data {
            NodeData::Text(text) => Some(text),
            NodeData::Element { .. } => None,
        }
    }

    fn selection(&self) -> Option<DomSelection> {
        self.selection
    }
}

impl MutationFeed for MemoryDom {
    fn observe(&mut self, root: NodeId) {
        self.observed = Some(root);
    }

    fn disconnect(&mut self) {
        self.observed = None;
        self.records.clear();
    }

    fn is_observing(&self) -> bool {
        self.observed.is_some()
    }

    fn take_records(&mut self) -> Vec<MutationRecord> {
        std::mem::take(&mut self.records)
    }
}
