use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::model::block::{BlockKey, ContentBlock};
use crate::model::block_tree::{BlockTree, Decorator};
use crate::model::character::StyleSet;
use crate::model::content::ContentState;
use crate::model::selection_state::SelectionState;

/// What kind of edit produced a document version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChangeType {
    /// Plain replacement of a leaf's text; styles are kept, entities dropped.
    ApplyEntity,
    BackspaceCharacter,
    DeleteCharacter,
    InsertCharacters,
    RemoveRange,
    /// Replacement that kept a mutable entity (spellcheck, autocorrect).
    SpellcheckChange,
    SplitBlock,
}

impl ChangeType {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeType::ApplyEntity => "apply-entity",
            ChangeType::BackspaceCharacter => "backspace-character",
            ChangeType::DeleteCharacter => "delete-character",
            ChangeType::InsertCharacters => "insert-characters",
            ChangeType::RemoveRange => "remove-range",
            ChangeType::SpellcheckChange => "spellcheck-change",
            ChangeType::SplitBlock => "split-block",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Prior document versions kept for [`EditorState::undo`].
const UNDO_LIMIT: usize = 100;

#[derive(Debug, Clone)]
struct TreeEntry {
    block: Arc<ContentBlock>,
    tree: Arc<BlockTree>,
}

/// Everything the surface needs to render and reconcile: the current
/// document, the selection, and the leaf layout of every block.
///
/// Editor states are values. Every operation returns a new state and
/// leaves the receiver untouched.
#[derive(Clone)]
pub struct EditorState {
    content: Arc<ContentState>,
    selection: SelectionState,
    trees: Arc<BTreeMap<BlockKey, TreeEntry>>,
    undo_stack: Arc<Vec<Arc<ContentState>>>,
    decorator: Option<Arc<dyn Decorator>>,
    force_selection: bool,
    in_composition_mode: bool,
    last_change_type: Option<ChangeType>,
    version: u64,
}

impl fmt::Debug for EditorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EditorState")
            .field("content", &self.content)
            .field("selection", &self.selection)
            .field("decorator", &self.decorator)
            .field("force_selection", &self.force_selection)
            .field("in_composition_mode", &self.in_composition_mode)
            .field("last_change_type", &self.last_change_type)
            .field("version", &self.version)
            .field("undo_depth", &self.undo_stack.len())
            .finish()
    }
}

impl EditorState {
    pub fn create_with_content(content: ContentState) -> Self {
        let selection = content.selection_after().clone();
        let content = Arc::new(content);
        let trees = regenerate_trees(&BTreeMap::new(), &content, None);
        Self {
            content,
            selection,
            trees: Arc::new(trees),
            undo_stack: Arc::new(Vec::new()),
            decorator: None,
            force_selection: false,
            in_composition_mode: false,
            last_change_type: None,
            version: 0,
        }
    }

    pub fn create_with_text(text: &str) -> Self {
        Self::create_with_content(ContentState::create_from_text(text))
    }

    /// Same state laid out with `decorator`; every block tree is rebuilt.
    pub fn with_decorator(&self, decorator: Arc<dyn Decorator>) -> Self {
        let trees = regenerate_trees(&BTreeMap::new(), &self.content, Some(decorator.as_ref()));
        Self {
            trees: Arc::new(trees),
            decorator: Some(decorator),
            ..self.clone()
        }
    }

    pub fn current_content(&self) -> &Arc<ContentState> {
        &self.content
    }

    pub fn selection(&self) -> &SelectionState {
        &self.selection
    }

    pub fn block_tree(&self, key: &BlockKey) -> Option<&BlockTree> {
        self.trees.get(key).map(|entry| entry.tree.as_ref())
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn last_change_type(&self) -> Option<ChangeType> {
        self.last_change_type
    }

    pub fn is_in_composition_mode(&self) -> bool {
        self.in_composition_mode
    }

    /// Whether the renderer must move the DOM selection to [`selection`](Self::selection).
    pub fn must_force_selection(&self) -> bool {
        self.force_selection
    }

    /// Commits `content` as the next version. The selection becomes the
    /// content's `selection_after`.
    pub fn push(&self, content: ContentState, change_type: ChangeType, force_selection: bool) -> Self {
        let selection = content.normalize_selection(content.selection_after().clone());
        let trees = regenerate_trees(&self.trees, &content, self.decorator.as_deref());
        let mut undo_stack = self.undo_stack.as_ref().clone();
        undo_stack.push(self.content.clone());
        if undo_stack.len() > UNDO_LIMIT {
            undo_stack.remove(0);
        }
        log::trace!(
            "push {change_type} -> version {} ({} blocks)",
            self.version + 1,
            content.block_count()
        );
        Self {
            content: Arc::new(content),
            selection,
            trees: Arc::new(trees),
            undo_stack: Arc::new(undo_stack),
            force_selection,
            last_change_type: Some(change_type),
            version: self.version + 1,
            ..self.clone()
        }
    }

    /// Steps back to the previous document version, restoring the
    /// selection that edit started from. Counts as a new version.
    pub fn undo(&self) -> Option<Self> {
        let mut undo_stack = self.undo_stack.as_ref().clone();
        let previous = undo_stack.pop()?;
        let selection = previous.normalize_selection(self.content.selection_before().clone());
        let trees = regenerate_trees(&self.trees, &previous, self.decorator.as_deref());
        Some(Self {
            content: previous,
            selection,
            trees: Arc::new(trees),
            undo_stack: Arc::new(undo_stack),
            force_selection: true,
            last_change_type: None,
            version: self.version + 1,
            ..self.clone()
        })
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    /// Takes `selection` as already reflected in the DOM.
    pub fn accept_selection(&self, selection: SelectionState) -> Self {
        Self {
            selection: self.content.normalize_selection(selection),
            force_selection: false,
            ..self.clone()
        }
    }

    /// Takes `selection` and asks the renderer to move the DOM selection.
    pub fn force_selection(&self, selection: SelectionState) -> Self {
        Self {
            selection: self.content.normalize_selection(selection),
            force_selection: true,
            ..self.clone()
        }
    }

    pub fn set_in_composition_mode(&self, in_composition_mode: bool) -> Self {
        Self {
            in_composition_mode,
            ..self.clone()
        }
    }

    /// Style new text typed at a collapsed caret should get: the style of
    /// the char before the caret, or of the first char at block start.
    pub fn current_style(&self) -> StyleSet {
        let key = self.selection.start_key();
        let offset = self.selection.start_offset();
        let Some(block) = self.content.block_for_key(key) else {
            return StyleSet::new();
        };
        if offset > 0 {
            block.style_at(offset - 1)
        } else {
            block.style_at(0)
        }
    }
}

fn regenerate_trees(
    previous: &BTreeMap<BlockKey, TreeEntry>,
    content: &ContentState,
    decorator: Option<&dyn Decorator>,
) -> BTreeMap<BlockKey, TreeEntry> {
    content
        .blocks()
        .iter()
        .map(|block| {
            let entry = match previous.get(block.key()) {
                Some(entry) if Arc::ptr_eq(&entry.block, block) => entry.clone(),
                _ => TreeEntry {
                    block: block.clone(),
                    tree: Arc::new(BlockTree::generate(content, block, decorator)),
                },
            };
            (block.key().clone(), entry)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::modifier;

    #[test]
    fn push_bumps_version_and_moves_selection() {
        let state = EditorState::create_with_text("hello");
        let key = state.current_content().first_block().key().clone();
        let caret = SelectionState::collapsed(key.clone(), 5);
        let content = modifier::insert_text(state.current_content(), &caret, "!", &StyleSet::new(), None).unwrap();

        let next = state.push(content, ChangeType::InsertCharacters, false);
        assert_eq!(next.version(), 1);
        assert_eq!(state.version(), 0);
        assert_eq!(next.selection(), &SelectionState::collapsed(key.clone(), 6));
        assert_eq!(next.last_change_type(), Some(ChangeType::InsertCharacters));
        assert_eq!(next.block_tree(&key).and_then(|t| t.leaf(0, 0)).map(|l| l.end), Some(6));
    }

    #[test]
    fn undo_restores_the_previous_version() {
        let state = EditorState::create_with_text("hello");
        let key = state.current_content().first_block().key().clone();
        let caret = SelectionState::collapsed(key.clone(), 5);
        let content = modifier::insert_text(state.current_content(), &caret, "!", &StyleSet::new(), None).unwrap();
        let edited = state.push(content, ChangeType::InsertCharacters, false);

        let undone = edited.undo().unwrap();
        assert_eq!(undone.current_content().first_block().text(), "hello");
        assert_eq!(undone.selection(), &caret);
        assert_eq!(undone.version(), 2);
        assert!(undone.must_force_selection());
        assert!(!undone.can_undo());
        assert!(undone.undo().is_none());
    }

    #[test]
    fn unchanged_blocks_keep_their_trees() {
        let state = EditorState::create_with_text("one\ntwo");
        let blocks = state.current_content().blocks().to_vec();
        let (first, second) = (blocks[0].key().clone(), blocks[1].key().clone());
        let caret = SelectionState::collapsed(second.clone(), 0);
        let content = modifier::insert_text(state.current_content(), &caret, "x", &StyleSet::new(), None).unwrap();
        let next = state.push(content, ChangeType::InsertCharacters, false);

        assert!(Arc::ptr_eq(&state.trees[&first].tree, &next.trees[&first].tree));
        assert!(!Arc::ptr_eq(&state.trees[&second].tree, &next.trees[&second].tree));
    }

    #[test]
    fn current_style_follows_the_char_before_the_caret() {
        let state = EditorState::create_with_text("ab");
        let key = state.current_content().first_block().key().clone();
        let block = state.current_content().first_block();
        let bolded = block.replace_text_range(0, 1, "a", &StyleSet::from_iter(["BOLD"]), None);
        let content = state.current_content().with_block(bolded).unwrap();
        let state = state
            .push(content, ChangeType::ApplyEntity, false)
            .accept_selection(SelectionState::collapsed(key.clone(), 1));
        assert!(state.current_style().contains("BOLD"));

        let state = state.accept_selection(SelectionState::collapsed(key, 2));
        assert!(state.current_style().is_empty());
    }
}
