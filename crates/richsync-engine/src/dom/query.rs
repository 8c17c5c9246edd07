//! Ancestor walks and text measurement over a [`DomTree`].

use crate::dom::{BLOCK_ATTR, DomTree, NodeId, OFFSET_KEY_ATTR, TEXT_ATTR};
use crate::model::block::BlockKey;
use crate::offset_key::OffsetKey;

/// Nearest element at or above `node` carrying an offset key, with the
/// decoded key. Keys that fail to decode are skipped.
pub fn find_ancestor_offset_key<D: DomTree + ?Sized>(dom: &D, node: NodeId) -> Option<(NodeId, OffsetKey)> {
    let mut current = Some(node);
    while let Some(id) = current {
        if let Some(encoded) = dom.attribute(id, OFFSET_KEY_ATTR) {
            match OffsetKey::decode(encoded) {
                Ok(key) => return Some((id, key)),
                Err(err) => log::warn!("ignoring {OFFSET_KEY_ATTR} on {id:?}: {err}"),
            }
        }
        current = dom.parent(id);
    }
    None
}

pub fn is_block_root<D: DomTree + ?Sized>(dom: &D, node: NodeId) -> bool {
    dom.attribute(node, BLOCK_ATTR) == Some("true")
}

/// Block key of a block root element.
pub fn block_key_of<D: DomTree + ?Sized>(dom: &D, node: NodeId) -> Option<BlockKey> {
    if !is_block_root(dom, node) {
        return None;
    }
    let encoded = dom.attribute(node, OFFSET_KEY_ATTR)?;
    OffsetKey::decode(encoded).ok().map(|key| key.block_key)
}

/// Nearest block root at or above `node`, with its key.
pub fn find_ancestor_block<D: DomTree + ?Sized>(dom: &D, node: NodeId) -> Option<(NodeId, BlockKey)> {
    let mut current = Some(node);
    while let Some(id) = current {
        if let Some(key) = block_key_of(dom, id) {
            return Some((id, key));
        }
        current = dom.parent(id);
    }
    None
}

/// The `<br data-text="true">` an empty leaf renders to hold its line open.
pub fn is_placeholder_break<D: DomTree + ?Sized>(dom: &D, node: NodeId) -> bool {
    dom.tag_name(node) == Some("br") && dom.attribute(node, TEXT_ATTR) == Some("true")
}

/// Length in chars of the text under `node`. A line break counts as one
/// char, except the empty-leaf placeholder which counts as none.
pub fn text_length<D: DomTree + ?Sized>(dom: &D, node: NodeId) -> usize {
    if let Some(text) = dom.text(node) {
        return text.chars().count();
    }
    match dom.tag_name(node) {
        Some("br") if is_placeholder_break(dom, node) => 0,
        Some("br") => 1,
        _ => dom
            .children(node)
            .iter()
            .map(|&child| text_length(dom, child))
            .sum(),
    }
}

/// Text under `node`, measured the way [`text_length`] counts it.
pub fn text_content<D: DomTree + ?Sized>(dom: &D, node: NodeId) -> String {
    let mut out = String::new();
    push_text(dom, node, &mut out);
    out
}

fn push_text<D: DomTree + ?Sized>(dom: &D, node: NodeId, out: &mut String) {
    if let Some(text) = dom.text(node) {
        out.push_str(text);
        return;
    }
    if dom.tag_name(node) == Some("br") {
        if !is_placeholder_break(dom, node) {
            out.push('\n');
        }
        return;
    }
    for &child in dom.children(node) {
        push_text(dom, child, out);
    }
}

/// Drops the extra `\n` the renderer appends after a trailing newline so
/// the line stays visible.
pub fn trim_soft_newline(text: &str) -> &str {
    if text.ends_with("\n\n") {
        &text[..text.len() - 1]
    } else {
        text
    }
}

/// Char offset of the DOM position `(node, offset)` measured from the
/// start of `container`, which must be `node` or one of its ancestors.
///
/// Only sibling text lengths are summed, so the result does not depend on
/// offset keys being intact.
pub fn offset_within<D: DomTree + ?Sized>(
    dom: &D,
    container: NodeId,
    node: NodeId,
    offset: usize,
) -> Option<usize> {
    let mut total = match dom.text(node) {
        Some(text) => offset.min(text.chars().count()),
        None => dom
            .children(node)
            .iter()
            .take(offset)
            .map(|&child| text_length(dom, child))
            .sum(),
    };
    let mut current = node;
    while current != container {
        let mut sibling = dom.previous_sibling(current);
        while let Some(id) = sibling {
            total += text_length(dom, id);
            sibling = dom.previous_sibling(id);
        }
        current = dom.parent(current)?;
    }
    Some(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::MemoryDom;
    use rstest::rstest;

    /// `<div data-block><span b1-0-0>ab</span><span b1-0-1>cd<br></span></div>`
    fn block() -> (MemoryDom, NodeId, NodeId, NodeId) {
        let mut dom = MemoryDom::new();
        let root = dom.root();
        let block = dom.create_element("div", &[(BLOCK_ATTR, "true"), (OFFSET_KEY_ATTR, "b1-0-0")]);
        let first = dom.create_element("span", &[(OFFSET_KEY_ATTR, "b1-0-0")]);
        let second = dom.create_element("span", &[(OFFSET_KEY_ATTR, "b1-0-1")]);
        let ab = dom.create_text("ab");
        let cd = dom.create_text("cd");
        let br = dom.create_element("br", &[]);
        dom.append_child(first, ab);
        dom.append_child(second, cd);
        dom.append_child(second, br);
        dom.append_child(block, first);
        dom.append_child(block, second);
        dom.append_child(root, block);
        (dom, block, ab, cd)
    }

    #[test]
    fn ancestors_resolve_to_leaf_and_block() {
        let (dom, block, _, cd) = block();
        let (_, key) = find_ancestor_offset_key(&dom, cd).unwrap();
        assert_eq!(key.encode(), "b1-0-1");
        assert_eq!(find_ancestor_block(&dom, cd), Some((block, BlockKey::from("b1"))));
        assert_eq!(find_ancestor_block(&dom, dom.root()), None);
    }

    #[test]
    fn line_breaks_count_unless_placeholder() {
        let (mut dom, block, _, _) = block();
        assert_eq!(text_content(&dom, block), "abcd\n");
        assert_eq!(text_length(&dom, block), 5);

        let placeholder = dom.create_element("br", &[(TEXT_ATTR, "true")]);
        dom.append_child(block, placeholder);
        assert_eq!(text_length(&dom, block), 5);
    }

    #[rstest]
    #[case::start_of_first(0, 0, 0)]
    #[case::inside_second(1, 1, 3)]
    #[case::end_of_second(1, 2, 4)]
    fn offsets_sum_preceding_text(#[case] which: usize, #[case] offset: usize, #[case] expected: usize) {
        let (dom, block, ab, cd) = block();
        let node = if which == 0 { ab } else { cd };
        assert_eq!(offset_within(&dom, block, node, offset), Some(expected));
    }

    #[test]
    fn element_offsets_count_children() {
        let (dom, block, _, _) = block();
        assert_eq!(offset_within(&dom, block, block, 1), Some(2));
        assert_eq!(offset_within(&dom, block, block, 2), Some(5));
    }
}
