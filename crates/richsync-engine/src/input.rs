//! Reconciles native text input the browser already applied to the DOM.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::composition::rebuild_block;
use crate::dom::query::{find_ancestor_offset_key, is_block_root, offset_within, text_content, trim_soft_newline};
use crate::dom::{DomSelection, DomTree, NodeId};
use crate::error::{EngineError, Result};
use crate::model::block::ContentBlock;
use crate::model::block_tree::LeafRange;
use crate::model::commands::Cmd;
use crate::model::content::ContentState;
use crate::model::editor_state::{ChangeType, EditorState};
use crate::model::entity::Entity;
use crate::model::modifier;
use crate::model::selection_state::SelectionState;
use crate::observer::MutationBatch;
use crate::offset_key::OffsetKey;
use crate::selection::reconstruct_selection;

/// Per-engine behaviour the reconcilers have to work around.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineQuirks {
    /// The engine stops updating its reported selection while a context
    /// menu (spellcheck suggestions) is open, and reports it accurately
    /// once the replacement lands. Gecko behaves this way.
    pub selection_frozen_during_context_menu: bool,
}

/// `InputEvent.inputType`, as far as the reconcilers care.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum InputType {
    InsertText,
    InsertCompositionText,
    InsertParagraph,
    DeleteContentBackward,
    DeleteContentForward,
    Other(String),
}

impl InputType {
    pub fn as_str(&self) -> &str {
        match self {
            InputType::InsertText => "insertText",
            InputType::InsertCompositionText => "insertCompositionText",
            InputType::InsertParagraph => "insertParagraph",
            InputType::DeleteContentBackward => "deleteContentBackward",
            InputType::DeleteContentForward => "deleteContentForward",
            InputType::Other(other) => other,
        }
    }

    /// The model edit for a deletion the model has not seen yet.
    fn deletion(&self) -> Option<Cmd> {
        match self {
            InputType::DeleteContentBackward => Some(Cmd::Backspace),
            InputType::DeleteContentForward => Some(Cmd::Delete),
            _ => None,
        }
    }
}

impl From<&str> for InputType {
    fn from(value: &str) -> Self {
        match value {
            "insertText" => InputType::InsertText,
            "insertCompositionText" => InputType::InsertCompositionText,
            "insertParagraph" => InputType::InsertParagraph,
            "deleteContentBackward" => InputType::DeleteContentBackward,
            "deleteContentForward" => InputType::DeleteContentForward,
            other => InputType::Other(other.to_string()),
        }
    }
}

impl From<String> for InputType {
    fn from(value: String) -> Self {
        InputType::from(value.as_str())
    }
}

impl From<InputType> for String {
    fn from(value: InputType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for InputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub enum InputOutcome {
    /// The DOM already shows the model.
    Unchanged,
    /// The model now matches what the browser did to the DOM.
    Reconciled(EditorState),
    /// The model applied an edit the DOM does not show; re-render from it.
    Restore(EditorState),
}

/// Single-leaf path: compares the anchor leaf's DOM text with the model
/// text of that leaf and folds any difference back into the model.
pub fn reconcile_input<D: DomTree + ?Sized>(
    state: &EditorState,
    dom: &D,
    root: NodeId,
    dom_selection: Option<&DomSelection>,
    input_type: Option<&InputType>,
    quirks: &EngineQuirks,
) -> Result<InputOutcome> {
    let Some(dom_selection) = dom_selection else {
        log::debug!("input without a DOM selection ignored");
        return Ok(InputOutcome::Unchanged);
    };
    let anchor = dom_selection.anchor.node;
    if !dom.is_within(anchor, root) {
        log::debug!("input outside the editable root ignored");
        return Ok(InputOutcome::Unchanged);
    }
    let Some((leaf_node, offset_key)) = find_ancestor_offset_key(dom, anchor) else {
        log::debug!("input on unaddressed node {anchor:?} ignored");
        return Ok(InputOutcome::Unchanged);
    };
    if is_block_root(dom, leaf_node) {
        log::debug!("input anchored on block root {leaf_node:?} ignored");
        return Ok(InputOutcome::Unchanged);
    }

    let content = state.current_content();
    let block = content.require_block(&offset_key.block_key)?;
    let leaf = leaf_range(state, &offset_key)?;
    // Sibling text nodes split inside one leaf are read as one.
    let dom_text = text_content(dom, leaf_node);
    let dom_text = trim_soft_newline(&dom_text);
    let model_text = block.text_slice(leaf.start..leaf.end);

    if dom_text == model_text {
        let Some(cmd) = input_type.and_then(InputType::deletion) else {
            return Ok(InputOutcome::Unchanged);
        };
        return Ok(match cmd.apply(state)? {
            Some(next) => InputOutcome::Restore(next),
            None => InputOutcome::Unchanged,
        });
    }

    let selection = state.selection();
    let (next, preserved) = replace_leaf_text(content, block, leaf, dom_text, selection)?;

    let caret = if quirks.selection_frozen_during_context_menu {
        let anchor = offset_within(dom, leaf_node, anchor, dom_selection.anchor.offset).unwrap_or(0);
        let focus = offset_within(dom, leaf_node, dom_selection.focus.node, dom_selection.focus.offset)
            .unwrap_or(anchor);
        let start = leaf.start + anchor.min(focus);
        let end = start + anchor.abs_diff(focus);
        SelectionState::range(block.key().clone(), start, end).with_focus(selection.has_focus)
    } else {
        let delta = dom_text.chars().count() as isize - model_text.chars().count() as isize;
        let end = selection.end_offset().saturating_add_signed(delta);
        let anchor_offset = if dom_selection.is_collapsed() {
            end
        } else {
            selection.start_offset()
        };
        SelectionState {
            anchor_offset,
            focus_offset: end,
            ..selection.clone()
        }
    };

    let change_type = if preserved {
        ChangeType::SpellcheckChange
    } else {
        ChangeType::ApplyEntity
    };
    let next = next
        .with_selection_before(selection.clone())
        .with_selection_after(caret);
    Ok(InputOutcome::Reconciled(state.push(next, change_type, true)))
}

/// Batch path, for input that touched several leaves or whole blocks.
/// Leaves are applied last to first so earlier ranges stay valid against
/// the pre-edit block trees. Returns `None` when the DOM already matched.
pub fn reconcile_leaf_mutations<D: DomTree + ?Sized>(
    state: &EditorState,
    dom: &D,
    root: NodeId,
    batch: &MutationBatch,
) -> Result<Option<EditorState>> {
    let selection = state.selection();
    let mut content = state.current_content().as_ref().clone();
    let mut changed = false;
    let mut preserved = false;
    let mut removed = false;

    for (key, change) in batch.leaves.iter().rev() {
        if batch.blocks.contains_key(&key.block_key) {
            continue;
        }
        let block = content.require_block(&key.block_key)?.clone();
        let leaf = leaf_range(state, key)?;
        match change {
            Some(text) => {
                let text = trim_soft_newline(text);
                if text == block.text_slice(leaf.start..leaf.end) {
                    continue;
                }
                let (next, kept) = replace_leaf_text(&content, &block, leaf, text, selection)?;
                content = next;
                preserved |= kept;
            }
            None => {
                let range = SelectionState::range(key.block_key.clone(), leaf.start, leaf.end);
                content = modifier::remove_range(&content, &range)?;
                removed = true;
            }
        }
        changed = true;
    }

    for (key, node) in &batch.blocks {
        let Some(block) = content.block_for_key(key).cloned() else {
            log::debug!("mutation for unknown block {key} ignored");
            continue;
        };
        match node {
            Some(node) => content = content.with_block(rebuild_block(dom, *node, state, &block))?,
            None => {
                content = content.without_block(key);
                removed = true;
            }
        }
        changed = true;
    }

    if !changed {
        return Ok(None);
    }

    let (after, force) = match dom.selection() {
        Some(dom_selection) => {
            let result = reconstruct_selection(dom, root, &dom_selection, &content);
            (result.selection, result.needs_recovery)
        }
        None => (content.normalize_selection(selection.clone()), true),
    };
    let change_type = if removed {
        ChangeType::RemoveRange
    } else if preserved {
        ChangeType::SpellcheckChange
    } else {
        ChangeType::ApplyEntity
    };
    log::debug!("reconciled {} mutated addresses as {change_type}", batch.len());
    let content = content
        .with_selection_before(selection.clone())
        .with_selection_after(after);
    Ok(Some(state.push(content, change_type, force)))
}

fn leaf_range(state: &EditorState, key: &OffsetKey) -> Result<LeafRange> {
    state
        .block_tree(&key.block_key)
        .ok_or_else(|| EngineError::UnknownBlock(key.block_key.clone()))?
        .leaf(key.decorator_key, key.leaf_key)
        .ok_or_else(|| EngineError::MissingLeaf(key.clone()))
}

/// Replaces a whole leaf with `text`, keeping the leaf's style. A mutable
/// entity survives the replacement; any other entity is dropped. The flag
/// reports whether an entity was kept.
fn replace_leaf_text(
    content: &ContentState,
    block: &ContentBlock,
    leaf: LeafRange,
    text: &str,
    selection: &SelectionState,
) -> Result<(ContentState, bool)> {
    let entity = block
        .entity_at(leaf.start)
        .filter(|key| content.entity(key).is_some_and(Entity::is_mutable))
        .cloned();
    let range = SelectionState::range(block.key().clone(), leaf.start, leaf.end).with_focus(selection.has_focus);
    let next = modifier::replace_text(content, &range, text, &block.style_at(leaf.start), entity.as_ref())?;
    Ok((next, entity.is_some()))
}
