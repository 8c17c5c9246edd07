//! Rebuilds a logical selection from the browser's DOM selection.

use crate::dom::query::{find_ancestor_block, offset_within};
use crate::dom::{DomPoint, DomSelection, DomTree, NodeId};
use crate::model::block::BlockKey;
use crate::model::content::ContentState;
use crate::model::selection_state::SelectionState;

#[derive(Debug, Clone, PartialEq)]
pub struct DomSelectionResult {
    pub selection: SelectionState,
    /// An endpoint could not be placed in a block; the selection was
    /// defaulted and the DOM selection should be forced back in line.
    pub needs_recovery: bool,
}

/// Maps both endpoints of `dom_selection` into `content`.
///
/// An anchor outside every block defaults to the start of the first block;
/// a focus outside every block collapses onto the anchor.
pub fn reconstruct_selection<D: DomTree + ?Sized>(
    dom: &D,
    root: NodeId,
    dom_selection: &DomSelection,
    content: &ContentState,
) -> DomSelectionResult {
    let anchor = locate(dom, root, dom_selection.anchor, content);
    let focus = locate(dom, root, dom_selection.focus, content);
    let needs_recovery = anchor.is_none() || focus.is_none();

    let (anchor_key, anchor_offset) = anchor.unwrap_or_else(|| {
        log::debug!("selection anchor {:?} is outside every block", dom_selection.anchor);
        (content.first_block().key().clone(), 0)
    });
    let (focus_key, focus_offset) = focus.unwrap_or_else(|| (anchor_key.clone(), anchor_offset));

    let selection = content.normalize_selection(SelectionState {
        anchor_key,
        anchor_offset,
        focus_key,
        focus_offset,
        is_backward: false,
        has_focus: true,
    });
    DomSelectionResult {
        selection,
        needs_recovery,
    }
}

/// Block and in-block offset of one endpoint, when it lies inside a block
/// the document knows about.
pub fn offset_in_block<D: DomTree + ?Sized>(
    dom: &D,
    point: DomPoint,
    content: &ContentState,
) -> Option<(BlockKey, usize)> {
    let (block_node, key) = find_ancestor_block(dom, point.node)?;
    content.block_for_key(&key)?;
    let offset = offset_within(dom, block_node, point.node, point.offset)?;
    Some((key, offset))
}

fn locate<D: DomTree + ?Sized>(
    dom: &D,
    root: NodeId,
    point: DomPoint,
    content: &ContentState,
) -> Option<(BlockKey, usize)> {
    if !dom.is_within(point.node, root) {
        return None;
    }
    offset_in_block(dom, point, content)
}
