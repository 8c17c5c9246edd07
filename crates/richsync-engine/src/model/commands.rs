use crate::error::Result;
use crate::model::character::EntityKey;
use crate::model::content::ContentState;
use crate::model::editor_state::{ChangeType, EditorState};
use crate::model::modifier;
use crate::model::selection_state::SelectionState;

/// Model-side edits the surface applies itself instead of letting the
/// browser touch the DOM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cmd {
    /// Replace the selection with text in the caret's current style.
    InsertText(String),
    /// Remove the selection, or the char before a collapsed caret.
    Backspace,
    /// Remove the selection, or the char after a collapsed caret.
    Delete,
    /// Split the caret's block in two.
    SplitBlock,
}

impl Cmd {
    /// Applies the command. `Ok(None)` means there was nothing to do,
    /// e.g. backspace at the very start of the document.
    pub fn apply(&self, state: &EditorState) -> Result<Option<EditorState>> {
        let content = state.current_content();
        let selection = state.selection();

        let (next, change_type) = match self {
            Cmd::InsertText(text) => {
                let entity = entity_for_selection(content, selection);
                let next = modifier::replace_text(
                    content,
                    selection,
                    text,
                    &state.current_style(),
                    entity.as_ref(),
                )?;
                (next, ChangeType::InsertCharacters)
            }
            Cmd::Backspace => {
                let Some(range) = backward_range(content, selection) else {
                    return Ok(None);
                };
                (modifier::remove_range(content, &range)?, ChangeType::BackspaceCharacter)
            }
            Cmd::Delete => {
                let Some(range) = forward_range(content, selection) else {
                    return Ok(None);
                };
                (modifier::remove_range(content, &range)?, ChangeType::DeleteCharacter)
            }
            Cmd::SplitBlock => (modifier::split_block(content, selection)?, ChangeType::SplitBlock),
        };

        Ok(Some(state.push(next, change_type, true)))
    }
}

/// Range a backspace removes: the selection itself, or one char (or the
/// boundary with the previous block) before a collapsed caret.
fn backward_range(content: &ContentState, selection: &SelectionState) -> Option<SelectionState> {
    if !selection.is_collapsed() {
        return Some(selection.clone());
    }
    let key = &selection.anchor_key;
    let offset = selection.anchor_offset;
    if offset > 0 {
        return Some(SelectionState::range(key.clone(), offset - 1, offset).with_focus(selection.has_focus));
    }
    let previous = content.block_before(key)?;
    Some(SelectionState {
        anchor_key: previous.key().clone(),
        anchor_offset: previous.length(),
        focus_key: key.clone(),
        focus_offset: 0,
        is_backward: false,
        has_focus: selection.has_focus,
    })
}

fn forward_range(content: &ContentState, selection: &SelectionState) -> Option<SelectionState> {
    if !selection.is_collapsed() {
        return Some(selection.clone());
    }
    let key = &selection.anchor_key;
    let offset = selection.anchor_offset;
    let block = content.block_for_key(key)?;
    if offset < block.length() {
        return Some(SelectionState::range(key.clone(), offset, offset + 1).with_focus(selection.has_focus));
    }
    let next = content.block_after(key)?;
    Some(SelectionState {
        anchor_key: key.clone(),
        anchor_offset: offset,
        focus_key: next.key().clone(),
        focus_offset: 0,
        is_backward: false,
        has_focus: selection.has_focus,
    })
}

/// Entity new text inserted over `selection` should inherit: only a
/// mutable entity, and for a caret only when it surrounds the caret.
pub(crate) fn entity_for_selection(
    content: &ContentState,
    selection: &SelectionState,
) -> Option<EntityKey> {
    let block = content.block_for_key(selection.start_key())?;
    let offset = selection.start_offset();
    let candidate = if selection.is_collapsed() {
        if offset == 0 {
            return None;
        }
        let before = block.entity_at(offset - 1);
        if before != block.entity_at(offset) {
            return None;
        }
        before
    } else {
        block.entity_at(offset)
    }?;
    content
        .entity(candidate)
        .filter(|entity| entity.is_mutable())
        .map(|_| candidate.clone())
}
