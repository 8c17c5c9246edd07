//! IME composition sessions.
//!
//! While an IME composes, the DOM under the caret is in flux and the
//! browser's selection reports are unreliable, so the session watches
//! whole blocks and only reconciles once composition has ended and a
//! short grace period passed without it starting again.
//!
//! ```text
//!            start                 end                 timer / keydown
//!   Idle ───────────▶ Composing ─────────▶ Resolving ─────────────────▶ Idle
//!                        ▲                     │
//!                        └──── start ──────────┘  (cancels the timer)
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::dom::query::{is_block_root, is_placeholder_break};
use crate::dom::{DomTree, MutationFeed, NodeId, OFFSET_KEY_ATTR};
use crate::error::Result;
use crate::model::block::ContentBlock;
use crate::model::character::CharacterMetadata;
use crate::model::editor_state::{ChangeType, EditorState};
use crate::observer::{DomObserver, MutationBatch, ObserveMode};
use crate::offset_key::OffsetKey;
use crate::selection::reconstruct_selection;

pub const DEFAULT_RESOLVE_DELAY: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub u64);

/// A scheduled resolution. Only the newest task of the live session is
/// honoured; anything else that fires is stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResolveTask {
    pub session: SessionId,
    pub generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositionPhase {
    Idle,
    Composing,
    Resolving,
}

#[derive(Debug)]
pub struct CompositionSession {
    phase: CompositionPhase,
    session: SessionId,
    generation: u64,
    pending: Option<ResolveTask>,
    resolved: bool,
    observer: DomObserver,
    /// State as it was when the session started; its block trees map the
    /// offset keys still present in the composed DOM.
    base: Option<EditorState>,
}

impl CompositionSession {
    pub fn new(root: NodeId) -> Self {
        Self {
            phase: CompositionPhase::Idle,
            session: SessionId(0),
            generation: 0,
            pending: None,
            resolved: false,
            observer: DomObserver::new(root, ObserveMode::Block),
            base: None,
        }
    }

    pub fn phase(&self) -> CompositionPhase {
        self.phase
    }

    pub fn session_id(&self) -> SessionId {
        self.session
    }

    pub fn pending_task(&self) -> Option<ResolveTask> {
        self.pending
    }

    /// Handles composition-start. Returns the resolution this cancelled,
    /// if composition restarted inside the grace period.
    pub fn start<D: DomTree + MutationFeed + ?Sized>(&mut self, state: &EditorState, dom: &mut D) -> Option<ResolveTask> {
        match self.phase {
            CompositionPhase::Idle => {
                self.session = SessionId(self.session.0 + 1);
                self.generation = 0;
                self.resolved = false;
                self.base = Some(state.clone());
                self.observer.start(dom);
                self.phase = CompositionPhase::Composing;
                log::debug!("composition session {} started", self.session.0);
                None
            }
            CompositionPhase::Composing => {
                self.observer.start(dom);
                None
            }
            CompositionPhase::Resolving => {
                self.phase = CompositionPhase::Composing;
                let cancelled = self.pending.take();
                log::debug!("composition session {} re-entered; resolution cancelled", self.session.0);
                cancelled
            }
        }
    }

    /// Handles composition-end. Returns the resolution to schedule;
    /// redundant ends for the same session return `None`.
    pub fn end(&mut self) -> Option<ResolveTask> {
        if self.phase != CompositionPhase::Composing {
            log::debug!("redundant composition end in {:?} ignored", self.phase);
            return None;
        }
        self.generation += 1;
        let task = ResolveTask {
            session: self.session,
            generation: self.generation,
        };
        self.pending = Some(task);
        self.phase = CompositionPhase::Resolving;
        Some(task)
    }

    /// Handles a fired resolution timer; stale tasks are ignored.
    pub fn on_timer<D: DomTree + MutationFeed + ?Sized>(
        &mut self,
        task: ResolveTask,
        state: &EditorState,
        dom: &mut D,
    ) -> Result<Option<EditorState>> {
        if self.phase != CompositionPhase::Resolving || self.pending != Some(task) {
            log::debug!("stale resolve task {task:?} ignored");
            return Ok(None);
        }
        self.resolve(state, dom)
    }

    /// Ends the session now and reconciles everything the IME did.
    /// Only the first call per session does anything.
    pub fn resolve<D: DomTree + MutationFeed + ?Sized>(
        &mut self,
        state: &EditorState,
        dom: &mut D,
    ) -> Result<Option<EditorState>> {
        if self.resolved || self.phase == CompositionPhase::Idle {
            log::debug!("composition session {} already resolved", self.session.0);
            return Ok(None);
        }
        self.resolved = true;
        self.phase = CompositionPhase::Idle;
        self.pending = None;

        let base = self.base.take().unwrap_or_else(|| state.clone());
        let batch = self.observer.stop_and_flush_mutations(dom);
        let next = resolve_mutations(state, &base, &*dom, &batch)?;
        log::info!(
            "composition session {} resolved: {} blocks touched, version {}",
            self.session.0,
            batch.blocks.len(),
            next.version()
        );
        Ok(Some(next.set_in_composition_mode(false)))
    }
}

fn resolve_mutations<D: DomTree + ?Sized>(
    state: &EditorState,
    base: &EditorState,
    dom: &D,
    batch: &MutationBatch,
) -> Result<EditorState> {
    if batch.blocks.is_empty() {
        return Ok(state.force_selection(base.selection().clone()));
    }

    let mut content = state.current_content().as_ref().clone();
    let mut changed = false;
    let mut removed = false;
    for (key, node) in &batch.blocks {
        let Some(block) = content.block_for_key(key).cloned() else {
            log::debug!("composition touched unknown block {key}");
            continue;
        };
        changed = true;
        match node {
            Some(node) => content = content.with_block(rebuild_block(dom, *node, base, &block))?,
            None => {
                content = content.without_block(key);
                removed = true;
            }
        }
    }
    if !changed {
        return Ok(state.force_selection(base.selection().clone()));
    }

    let selection = match dom.selection() {
        Some(dom_selection) => reconstruct_selection(dom, dom.root(), &dom_selection, &content).selection,
        None => content.normalize_selection(base.selection().clone()),
    };
    let change_type = if removed {
        ChangeType::RemoveRange
    } else {
        ChangeType::InsertCharacters
    };
    let content = content
        .with_selection_before(base.selection().clone())
        .with_selection_after(selection);
    Ok(state.push(content, change_type, true))
}

/// Re-reads a block from its live DOM subtree.
///
/// Text nodes are concatenated and line breaks read as `\n` (the
/// empty-leaf placeholder reads as nothing). Each span takes the metadata
/// its offset key had in `base`; text with no usable key gets empty
/// metadata so it is kept rather than lost.
pub fn rebuild_block<D: DomTree + ?Sized>(
    dom: &D,
    block_node: NodeId,
    base: &EditorState,
    block: &ContentBlock,
) -> ContentBlock {
    let mut text = String::new();
    let mut characters = Vec::new();
    collect(dom, block_node, block_node, base, &mut text, &mut characters);
    if text.ends_with("\n\n") {
        text.pop();
        characters.pop();
    }
    block.with_content(text, characters)
}

fn collect<D: DomTree + ?Sized>(
    dom: &D,
    block_node: NodeId,
    node: NodeId,
    base: &EditorState,
    text: &mut String,
    characters: &mut Vec<Arc<CharacterMetadata>>,
) {
    if let Some(data) = dom.text(node) {
        let meta = leaf_metadata(dom, block_node, node, base);
        text.push_str(data);
        characters.extend(std::iter::repeat_n(meta, data.chars().count()));
        return;
    }
    if dom.tag_name(node) == Some("br") {
        if !is_placeholder_break(dom, node) {
            text.push('\n');
            characters.push(leaf_metadata(dom, block_node, node, base));
        }
        return;
    }
    for &child in dom.children(node) {
        collect(dom, block_node, child, base, text, characters);
    }
}

fn leaf_metadata<D: DomTree + ?Sized>(
    dom: &D,
    block_node: NodeId,
    node: NodeId,
    base: &EditorState,
) -> Arc<CharacterMetadata> {
    let mut current = Some(node);
    while let Some(id) = current {
        if id == block_node || is_block_root(dom, id) {
            break;
        }
        if let Some(key) = dom
            .attribute(id, OFFSET_KEY_ATTR)
            .and_then(|encoded| OffsetKey::decode(encoded).ok())
        {
            return lookup(base, &key).unwrap_or_else(CharacterMetadata::empty);
        }
        current = dom.parent(id);
    }
    log::debug!("text node {node:?} has no leaf; using empty metadata");
    CharacterMetadata::empty()
}

fn lookup(base: &EditorState, key: &OffsetKey) -> Option<Arc<CharacterMetadata>> {
    let leaf = base
        .block_tree(&key.block_key)?
        .leaf(key.decorator_key, key.leaf_key)?;
    let block = base.current_content().block_for_key(&key.block_key)?;
    block.metadata_at(leaf.start).filter(|_| !leaf.is_empty()).cloned()
}
