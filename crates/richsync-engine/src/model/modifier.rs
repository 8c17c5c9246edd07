//! Range edits over [`ContentState`].
//!
//! Every function returns a new document version whose `selection_before`
//! is the range that was edited and whose `selection_after` is the caret the
//! edit leaves behind.

use std::sync::Arc;

use crate::error::Result;
use crate::model::block::{BlockKey, ContentBlock};
use crate::model::character::{EntityKey, StyleSet};
use crate::model::content::ContentState;
use crate::model::selection_state::SelectionState;

/// Replaces `range` with `text`, the new chars carrying `style`/`entity`.
pub fn replace_text(
    content: &ContentState,
    range: &SelectionState,
    text: &str,
    style: &StyleSet,
    entity: Option<&EntityKey>,
) -> Result<ContentState> {
    let removed = remove_range(content, range)?;
    let caret = removed.selection_after().clone();
    let inserted = insert_text(&removed, &caret, text, style, entity)?;
    Ok(inserted.with_selection_before(range.clone()))
}

/// Inserts `text` at the start of `at`, which is expected to be collapsed.
pub fn insert_text(
    content: &ContentState,
    at: &SelectionState,
    text: &str,
    style: &StyleSet,
    entity: Option<&EntityKey>,
) -> Result<ContentState> {
    let key = at.start_key();
    let offset = at.start_offset();
    let block = content.require_block(key)?;
    let updated = block.replace_text_range(offset, offset, text, style, entity);
    let caret = SelectionState::collapsed(key.clone(), offset + text.chars().count())
        .with_focus(at.has_focus);
    Ok(content
        .with_block(updated)?
        .with_selection_before(at.clone())
        .with_selection_after(caret))
}

/// Removes the text covered by `range`. Across blocks, the tail of the end
/// block is joined onto the start block and everything after the start
/// block up to and including the end block is dropped.
pub fn remove_range(content: &ContentState, range: &SelectionState) -> Result<ContentState> {
    let start_key = range.start_key();
    let start_offset = range.start_offset();
    let end_key = range.end_key();
    let end_offset = range.end_offset();
    let caret = SelectionState::collapsed(start_key.clone(), start_offset).with_focus(range.has_focus);

    if range.is_collapsed() {
        return Ok(content
            .with_selection_before(range.clone())
            .with_selection_after(caret));
    }

    let start_block = content.require_block(start_key)?;
    let next = if start_key == end_key {
        content.with_block(start_block.remove_text_range(start_offset, end_offset))?
    } else {
        let end_block = content.require_block(end_key)?;
        let joined = join_blocks(start_block, start_offset, end_block, end_offset);

        let start_index = content.block_index(start_key).unwrap_or_default();
        let end_index = content.block_index(end_key).unwrap_or(start_index);
        let blocks: Vec<Arc<ContentBlock>> = content
            .blocks()
            .iter()
            .enumerate()
            .filter_map(|(index, block)| {
                if index == start_index {
                    Some(Arc::new(joined.clone()))
                } else if index > start_index && index <= end_index {
                    None
                } else {
                    Some(block.clone())
                }
            })
            .collect();
        content.with_block_list(blocks)
    };

    Ok(next
        .with_selection_before(range.clone())
        .with_selection_after(caret))
}

fn join_blocks(
    start: &ContentBlock,
    start_offset: usize,
    end: &ContentBlock,
    end_offset: usize,
) -> ContentBlock {
    let mut text = start.text_slice(0..start_offset).to_string();
    text.push_str(end.text_slice(end_offset..end.length()));
    let mut characters = start.characters()[..start_offset].to_vec();
    characters.extend_from_slice(&end.characters()[end_offset..]);
    start.with_content(text, characters)
}

/// Splits the block at `at`; the tail moves into a new block right after
/// it and the caret lands at the start of that new block.
pub fn split_block(content: &ContentState, at: &SelectionState) -> Result<ContentState> {
    let removed = remove_range(content, at)?;
    let key = at.start_key();
    let offset = at.start_offset();
    let block = removed.require_block(key)?;

    let head = block.with_content(
        block.text_slice(0..offset),
        block.characters()[..offset].to_vec(),
    );
    let tail = block
        .with_content(
            block.text_slice(offset..block.length()),
            block.characters()[offset..].to_vec(),
        )
        .with_key(BlockKey::generate());
    let tail_key = tail.key().clone();

    Ok(removed
        .with_block(head)?
        .with_block_after(key, tail)?
        .with_selection_before(at.clone())
        .with_selection_after(SelectionState::collapsed(tail_key, 0).with_focus(at.has_focus)))
}

/// Drops the block keyed `key`. The caret moves to the end of the block
/// before it, or to the start of whatever block takes its place.
pub fn remove_block(content: &ContentState, key: &BlockKey) -> Result<ContentState> {
    content.require_block(key)?;
    let next = content.without_block(key);
    let caret = match content.block_before(key) {
        Some(previous) => SelectionState::collapsed(previous.key().clone(), previous.length()),
        None => SelectionState::collapsed(next.first_block().key().clone(), 0),
    };
    Ok(next
        .with_selection_before(content.selection_after().clone())
        .with_selection_after(caret))
}
