use serde::{Deserialize, Serialize};

use crate::model::block::BlockKey;

/// Logical selection expressed in block keys and char offsets.
///
/// `is_backward` is derived from document order; use
/// [`ContentState::normalize_selection`](crate::model::ContentState::normalize_selection)
/// after building a selection from raw endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SelectionState {
    pub anchor_key: BlockKey,
    pub anchor_offset: usize,
    pub focus_key: BlockKey,
    pub focus_offset: usize,
    pub is_backward: bool,
    pub has_focus: bool,
}

impl SelectionState {
    /// Collapsed, unfocused caret at the start of `key`.
    pub fn create_empty(key: BlockKey) -> Self {
        Self::collapsed(key, 0).with_focus(false)
    }

    /// Focused caret at `offset` in `key`.
    pub fn collapsed(key: BlockKey, offset: usize) -> Self {
        Self {
            anchor_key: key.clone(),
            anchor_offset: offset,
            focus_key: key,
            focus_offset: offset,
            is_backward: false,
            has_focus: true,
        }
    }

    /// Forward range within one block.
    pub fn range(key: BlockKey, start: usize, end: usize) -> Self {
        Self {
            anchor_key: key.clone(),
            anchor_offset: start,
            focus_key: key,
            focus_offset: end,
            is_backward: false,
            has_focus: true,
        }
    }

    pub fn with_focus(mut self, has_focus: bool) -> Self {
        self.has_focus = has_focus;
        self
    }

    pub fn with_offsets(mut self, anchor_offset: usize, focus_offset: usize) -> Self {
        self.anchor_offset = anchor_offset;
        self.focus_offset = focus_offset;
        self
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor_key == self.focus_key && self.anchor_offset == self.focus_offset
    }

    pub fn start_key(&self) -> &BlockKey {
        if self.is_backward { &self.focus_key } else { &self.anchor_key }
    }

    pub fn start_offset(&self) -> usize {
        if self.is_backward { self.focus_offset } else { self.anchor_offset }
    }

    pub fn end_key(&self) -> &BlockKey {
        if self.is_backward { &self.anchor_key } else { &self.focus_key }
    }

    pub fn end_offset(&self) -> usize {
        if self.is_backward { self.anchor_offset } else { self.focus_offset }
    }

    /// True when the selection starts or ends inside `[start, end]` of `key`.
    pub fn has_edge_within(&self, key: &BlockKey, start: usize, end: usize) -> bool {
        let within = |k: &BlockKey, offset: usize| k == key && (start..=end).contains(&offset);
        within(&self.anchor_key, self.anchor_offset) || within(&self.focus_key, self.focus_offset)
    }
}
