//! Narrow view of the editable DOM.
//!
//! The engine never owns the live DOM. It reads it through [`DomTree`],
//! hears about changes through [`MutationFeed`], and finds its way around
//! using the addressing attributes the renderer stamps on every block root
//! and leaf.

pub mod memory;
pub mod query;
pub mod render;

use serde::{Deserialize, Serialize};

pub use memory::MemoryDom;
pub use render::{BlockRenderer, Renderer};

/// `"{block}-{decorator}-{leaf}"` on leaves and block roots.
pub const OFFSET_KEY_ATTR: &str = "data-offset-key";
/// `"true"` on block roots.
pub const BLOCK_ATTR: &str = "data-block";
/// `"true"` on the `<br>` that holds an empty leaf open, and on text spans.
pub const TEXT_ATTR: &str = "data-text";
pub const DECORATOR_ATTR: &str = "data-decorator";
pub const ENTITY_ATTR: &str = "data-entity";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

/// A position in the DOM: a char offset inside a text node, or a child
/// index inside an element.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomPoint {
    pub node: NodeId,
    pub offset: usize,
}

impl DomPoint {
    pub fn new(node: NodeId, offset: usize) -> Self {
        Self { node, offset }
    }
}

/// The browser's selection as the host read it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomSelection {
    pub anchor: DomPoint,
    pub focus: DomPoint,
}

impl DomSelection {
    pub fn collapsed(point: DomPoint) -> Self {
        Self {
            anchor: point,
            focus: point,
        }
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }
}

pub trait DomTree {
    /// The contentEditable element the editor renders into.
    fn root(&self) -> NodeId;
    fn parent(&self, node: NodeId) -> Option<NodeId>;
    /// Empty for text nodes.
    fn children(&self, node: NodeId) -> &[NodeId];
    /// Lower-case tag name; `None` for text nodes.
    fn tag_name(&self, node: NodeId) -> Option<&str>;
    fn attribute(&self, node: NodeId, name: &str) -> Option<&str>;
    /// Character data; `None` for elements.
    fn text(&self, node: NodeId) -> Option<&str>;
    fn selection(&self) -> Option<DomSelection>;

    fn is_text(&self, node: NodeId) -> bool {
        self.text(node).is_some()
    }

    fn child_index(&self, node: NodeId) -> Option<usize> {
        let parent = self.parent(node)?;
        self.children(parent).iter().position(|&child| child == node)
    }

    fn previous_sibling(&self, node: NodeId) -> Option<NodeId> {
        let parent = self.parent(node)?;
        let index = self.child_index(node)?;
        index.checked_sub(1).map(|i| self.children(parent)[i])
    }

    fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        let parent = self.parent(node)?;
        let index = self.child_index(node)?;
        self.children(parent).get(index + 1).copied()
    }

    /// Whether `node` is `ancestor` or sits somewhere below it.
    fn is_within(&self, node: NodeId, ancestor: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MutationKind {
    CharacterData,
    ChildList,
}

/// One change notification, shaped like the browser's `MutationRecord`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MutationRecord {
    pub kind: MutationKind,
    pub target: NodeId,
    pub added_nodes: Vec<NodeId>,
    pub removed_nodes: Vec<NodeId>,
}

impl MutationRecord {
    pub fn character_data(target: NodeId) -> Self {
        Self {
            kind: MutationKind::CharacterData,
            target,
            added_nodes: Vec::new(),
            removed_nodes: Vec::new(),
        }
    }

    pub fn child_list(target: NodeId, added_nodes: Vec<NodeId>, removed_nodes: Vec<NodeId>) -> Self {
        Self {
            kind: MutationKind::ChildList,
            target,
            added_nodes,
            removed_nodes,
        }
    }
}

/// Subtree-scoped stream of character-data and child-list changes.
pub trait MutationFeed {
    fn observe(&mut self, root: NodeId);
    fn disconnect(&mut self);
    fn is_observing(&self) -> bool;
    /// Drains the records delivered since the last call.
    fn take_records(&mut self) -> Vec<MutationRecord>;
}
