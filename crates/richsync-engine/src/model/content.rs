use std::sync::{Arc, OnceLock};

use regex::Regex;

use crate::error::{EngineError, Result};
use crate::model::block::{BlockKey, ContentBlock};
use crate::model::character::EntityKey;
use crate::model::entity::{Entity, EntityMap};
use crate::model::selection_state::SelectionState;

fn line_break() -> &'static Regex {
    static LINE_BREAK: OnceLock<Regex> = OnceLock::new();
    LINE_BREAK.get_or_init(|| Regex::new(r"\r\n?|\n").expect("line break pattern is valid"))
}

/// One immutable version of the document.
///
/// Blocks are shared between versions through `Arc`; producing a new
/// version clones the block list (pointers only) and swaps in the blocks
/// that changed. A document always holds at least one block.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentState {
    blocks: Arc<Vec<Arc<ContentBlock>>>,
    entity_map: EntityMap,
    selection_before: SelectionState,
    selection_after: SelectionState,
}

impl ContentState {
    /// One unstyled block per line of `text`.
    pub fn create_from_text(text: &str) -> Self {
        let blocks = line_break()
            .split(text)
            .map(|line| ContentBlock::new(BlockKey::generate(), line))
            .collect();
        Self::create_from_blocks(blocks)
    }

    pub fn create_from_blocks(blocks: Vec<ContentBlock>) -> Self {
        let mut blocks: Vec<Arc<ContentBlock>> = blocks.into_iter().map(Arc::new).collect();
        if blocks.is_empty() {
            blocks.push(Arc::new(ContentBlock::new(BlockKey::generate(), "")));
        }
        let selection = SelectionState::create_empty(blocks[0].key().clone());
        Self {
            blocks: Arc::new(blocks),
            entity_map: EntityMap::new(),
            selection_before: selection.clone(),
            selection_after: selection,
        }
    }

    pub fn blocks(&self) -> &[Arc<ContentBlock>] {
        &self.blocks
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn block_index(&self, key: &BlockKey) -> Option<usize> {
        self.blocks.iter().position(|block| block.key() == key)
    }

    pub fn block_for_key(&self, key: &BlockKey) -> Option<&Arc<ContentBlock>> {
        self.blocks.iter().find(|block| block.key() == key)
    }

    /// Like [`block_for_key`](Self::block_for_key) but reports a missing block as an error.
    pub fn require_block(&self, key: &BlockKey) -> Result<&Arc<ContentBlock>> {
        self.block_for_key(key)
            .ok_or_else(|| EngineError::UnknownBlock(key.clone()))
    }

    pub fn first_block(&self) -> &Arc<ContentBlock> {
        &self.blocks[0]
    }

    pub fn block_before(&self, key: &BlockKey) -> Option<&Arc<ContentBlock>> {
        let index = self.block_index(key)?;
        index.checked_sub(1).map(|i| &self.blocks[i])
    }

    pub fn block_after(&self, key: &BlockKey) -> Option<&Arc<ContentBlock>> {
        let index = self.block_index(key)?;
        self.blocks.get(index + 1)
    }

    pub fn plain_text(&self, delimiter: &str) -> String {
        self.blocks
            .iter()
            .map(|block| block.text())
            .collect::<Vec<_>>()
            .join(delimiter)
    }

    pub fn has_text(&self) -> bool {
        self.blocks.len() > 1 || !self.blocks[0].is_empty()
    }

    pub fn entity_map(&self) -> &EntityMap {
        &self.entity_map
    }

    pub fn entity(&self, key: &EntityKey) -> Option<&Entity> {
        self.entity_map.get(key)
    }

    pub fn create_entity(&self, entity: Entity) -> (Self, EntityKey) {
        let (entity_map, key) = self.entity_map.create(entity);
        (Self { entity_map, ..self.clone() }, key)
    }

    pub fn with_entity(&self, key: EntityKey, entity: Entity) -> Self {
        Self {
            entity_map: self.entity_map.insert(key, entity),
            ..self.clone()
        }
    }

    pub fn selection_before(&self) -> &SelectionState {
        &self.selection_before
    }

    pub fn selection_after(&self) -> &SelectionState {
        &self.selection_after
    }

    pub fn with_selection_before(&self, selection: SelectionState) -> Self {
        Self {
            selection_before: selection,
            ..self.clone()
        }
    }

    pub fn with_selection_after(&self, selection: SelectionState) -> Self {
        Self {
            selection_after: selection,
            ..self.clone()
        }
    }

    /// Replaces the block that has the same key as `block`.
    pub fn with_block(&self, block: ContentBlock) -> Result<Self> {
        let index = self
            .block_index(block.key())
            .ok_or_else(|| EngineError::UnknownBlock(block.key().clone()))?;
        let mut blocks = self.blocks.as_ref().clone();
        blocks[index] = Arc::new(block);
        Ok(self.with_block_list(blocks))
    }

    /// Inserts `block` right after the block keyed `after`.
    pub fn with_block_after(&self, after: &BlockKey, block: ContentBlock) -> Result<Self> {
        let index = self
            .block_index(after)
            .ok_or_else(|| EngineError::UnknownBlock(after.clone()))?;
        let mut blocks = self.blocks.as_ref().clone();
        blocks.insert(index + 1, Arc::new(block));
        Ok(self.with_block_list(blocks))
    }

    /// Drops the block keyed `key`. Removing the last remaining block leaves
    /// a single empty block behind.
    pub fn without_block(&self, key: &BlockKey) -> Self {
        let blocks: Vec<Arc<ContentBlock>> = self
            .blocks
            .iter()
            .filter(|block| block.key() != key)
            .cloned()
            .collect();
        if blocks.is_empty() {
            return self.with_block_list(vec![Arc::new(ContentBlock::new(BlockKey::generate(), ""))]);
        }
        self.with_block_list(blocks)
    }

    pub(crate) fn with_block_list(&self, blocks: Vec<Arc<ContentBlock>>) -> Self {
        assert!(!blocks.is_empty(), "a document needs at least one block");
        Self {
            blocks: Arc::new(blocks),
            ..self.clone()
        }
    }

    /// Whether a selection from anchor to focus runs against document order.
    pub fn is_backward(
        &self,
        anchor_key: &BlockKey,
        anchor_offset: usize,
        focus_key: &BlockKey,
        focus_offset: usize,
    ) -> bool {
        if anchor_key == focus_key {
            return anchor_offset > focus_offset;
        }
        for block in self.blocks.iter() {
            if block.key() == focus_key {
                return true;
            }
            if block.key() == anchor_key {
                return false;
            }
        }
        false
    }

    /// Clamps offsets to their blocks and recomputes `is_backward`.
    pub fn normalize_selection(&self, selection: SelectionState) -> SelectionState {
        let clamp = |key: &BlockKey, offset: usize| {
            self.block_for_key(key)
                .map_or(offset, |block| offset.min(block.length()))
        };
        let anchor_offset = clamp(&selection.anchor_key, selection.anchor_offset);
        let focus_offset = clamp(&selection.focus_key, selection.focus_offset);
        let is_backward = self.is_backward(
            &selection.anchor_key,
            anchor_offset,
            &selection.focus_key,
            focus_offset,
        );
        SelectionState {
            anchor_offset,
            focus_offset,
            is_backward,
            ..selection
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn create_from_text_splits_on_every_line_break_style() {
        let content = ContentState::create_from_text("one\ntwo\r\nthree\rfour");
        let texts: Vec<&str> = content.blocks().iter().map(|b| b.text()).collect();
        assert_eq!(texts, vec!["one", "two", "three", "four"]);
        assert_eq!(content.plain_text("\n"), "one\ntwo\nthree\nfour");
    }

    #[test]
    fn empty_text_still_has_one_block() {
        let content = ContentState::create_from_text("");
        assert_eq!(content.block_count(), 1);
        assert!(!content.has_text());
    }

    #[test]
    fn with_block_shares_untouched_blocks() {
        let content = ContentState::create_from_blocks(vec![
            ContentBlock::new(BlockKey::from("b1"), "first"),
            ContentBlock::new(BlockKey::from("b2"), "second"),
        ]);
        let edited = content
            .with_block(ContentBlock::new(BlockKey::from("b2"), "changed"))
            .unwrap();

        assert!(Arc::ptr_eq(&content.blocks()[0], &edited.blocks()[0]));
        assert_eq!(content.blocks()[1].text(), "second");
        assert_eq!(edited.blocks()[1].text(), "changed");
    }

    #[test]
    fn with_block_rejects_unknown_keys() {
        let content = ContentState::create_from_text("x");
        let result = content.with_block(ContentBlock::new(BlockKey::from("nope"), "y"));
        assert!(matches!(result, Err(EngineError::UnknownBlock(_))));
    }

    #[test]
    fn backward_is_derived_from_block_order() {
        let content = ContentState::create_from_blocks(vec![
            ContentBlock::new(BlockKey::from("b1"), "first"),
            ContentBlock::new(BlockKey::from("b2"), "second"),
        ]);
        let b1 = BlockKey::from("b1");
        let b2 = BlockKey::from("b2");
        assert!(content.is_backward(&b2, 3, &b1, 1));
        assert!(!content.is_backward(&b1, 3, &b2, 1));
        assert!(content.is_backward(&b1, 3, &b1, 1));
    }

    #[test]
    fn normalize_clamps_offsets_to_block_length() {
        let content = ContentState::create_from_blocks(vec![ContentBlock::new(
            BlockKey::from("b1"),
            "abc",
        )]);
        let normalized = content.normalize_selection(SelectionState::range(BlockKey::from("b1"), 9, 1));
        assert_eq!(normalized.anchor_offset, 3);
        assert!(normalized.is_backward);
    }

    #[test]
    fn removing_the_only_block_leaves_an_empty_one() {
        let content = ContentState::create_from_blocks(vec![ContentBlock::new(BlockKey::from("b1"), "x")]);
        let emptied = content.without_block(&BlockKey::from("b1"));
        assert_eq!(emptied.block_count(), 1);
        assert_ne!(emptied.first_block().key(), &BlockKey::from("b1"));
        assert!(!emptied.has_text());
    }

    #[test]
    fn created_entities_get_fresh_keys_and_leave_the_source_untouched() {
        use crate::model::entity::Mutability;

        let content = ContentState::create_from_text("see docs")
            .with_entity(EntityKey::from("1"), Entity::new("LINK", Mutability::Mutable));
        let (next, key) = content.create_entity(Entity::new("MENTION", Mutability::Immutable));

        assert_ne!(key, EntityKey::from("1"));
        assert!(content.entity(&key).is_none());
        assert!(next.entity(&key).is_some_and(|entity| !entity.is_mutable()));
        assert!(next.entity(&EntityKey::from("1")).is_some_and(Entity::is_mutable));
        assert!(Arc::ptr_eq(next.first_block(), content.first_block()));
    }
}
