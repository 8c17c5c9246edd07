//! Event dispatch for one editable surface.
//!
//! The host feeds browser events to [`EditorSurface::handle_event`] along
//! with its DOM, and carries out the returned [`Effect`]s: cancel the
//! native action, run or cancel a timer, re-render. Edit mode handles
//! ordinary typing; composite mode hands everything to the surface's own
//! [`CompositionSession`] until the IME is done.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::composition::{CompositionPhase, CompositionSession, DEFAULT_RESOLVE_DELAY, ResolveTask};
use crate::dom::query::{find_ancestor_offset_key, is_block_root};
use crate::dom::{DomSelection, DomTree, MutationFeed, NodeId};
use crate::error::Result;
use crate::input::{EngineQuirks, InputOutcome, InputType, reconcile_input, reconcile_leaf_mutations};
use crate::model::character::CharacterMetadata;
use crate::model::commands::{Cmd, entity_for_selection};
use crate::model::editor_state::{ChangeType, EditorState};
use crate::observer::{DomObserver, MutationBatch, ObserveMode};
use crate::selection::reconstruct_selection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceOptions {
    /// Grace period between composition-end and reconciliation.
    pub resolve_delay: Duration,
    pub quirks: EngineQuirks,
}

impl Default for SurfaceOptions {
    fn default() -> Self {
        Self {
            resolve_delay: DEFAULT_RESOLVE_DELAY,
            quirks: EngineQuirks::default(),
        }
    }
}

/// `KeyboardEvent.key`, as far as the surface cares.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Key {
    ArrowLeft,
    ArrowRight,
    ArrowUp,
    ArrowDown,
    Enter,
    Backspace,
    Delete,
    Other(String),
}

impl Key {
    pub fn as_str(&self) -> &str {
        match self {
            Key::ArrowLeft => "ArrowLeft",
            Key::ArrowRight => "ArrowRight",
            Key::ArrowUp => "ArrowUp",
            Key::ArrowDown => "ArrowDown",
            Key::Enter => "Enter",
            Key::Backspace => "Backspace",
            Key::Delete => "Delete",
            Key::Other(other) => other,
        }
    }

    pub fn is_arrow(&self) -> bool {
        matches!(self, Key::ArrowLeft | Key::ArrowRight | Key::ArrowUp | Key::ArrowDown)
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        match value {
            "ArrowLeft" => Key::ArrowLeft,
            "ArrowRight" => Key::ArrowRight,
            "ArrowUp" => Key::ArrowUp,
            "ArrowDown" => Key::ArrowDown,
            "Enter" | "Return" => Key::Enter,
            "Backspace" => Key::Backspace,
            "Delete" => Key::Delete,
            other => Key::Other(other.to_string()),
        }
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key::from(value.as_str())
    }
}

impl From<Key> for String {
    fn from(value: Key) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Focus,
    Blur,
    CompositionStart,
    CompositionEnd,
    /// `is_composing` is the platform's `KeyboardEvent.isComposing`.
    KeyDown { key: Key, is_composing: bool },
    KeyUp(Key),
    KeyPress(Key),
    BeforeInput { input_type: InputType, data: Option<String> },
    Input { input_type: Option<InputType> },
    Select,
    SelectionChange,
    MouseDown,
    MouseUp,
    Copy,
    Cut,
    DragStart,
    DragEnd,
    /// A timer scheduled through [`Effect::ScheduleResolve`] fired.
    ResolveTimer(ResolveTask),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Cancel the browser's native handling of the event.
    PreventDefault,
    /// Deliver [`Event::ResolveTimer`] with `task` after `delay`.
    ScheduleResolve { task: ResolveTask, delay: Duration },
    /// Drop a timer scheduled earlier.
    CancelResolve(ResolveTask),
    /// A new document version was pushed.
    Committed { change_type: ChangeType, version: u64 },
    /// Re-render from [`EditorSurface::state`]; move the DOM selection too
    /// when `force_selection` is set.
    Render { force_selection: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Edit,
    Composite,
}

#[derive(Debug)]
pub struct EditorSurface {
    state: EditorState,
    root: NodeId,
    options: SurfaceOptions,
    mode: Mode,
    composition: CompositionSession,
    observer: DomObserver,
    /// Model side of a native insertion the browser is about to perform.
    pending: Option<EditorState>,
    /// The DOM selection may have moved without a selection event.
    selection_stale: bool,
}

impl EditorSurface {
    pub fn new(state: EditorState, root: NodeId, options: SurfaceOptions) -> Self {
        Self {
            state,
            root,
            options,
            mode: Mode::Edit,
            composition: CompositionSession::new(root),
            observer: DomObserver::new(root, ObserveMode::Leaf),
            pending: None,
            selection_stale: false,
        }
    }

    pub fn state(&self) -> &EditorState {
        &self.state
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn composition_phase(&self) -> CompositionPhase {
        self.composition.phase()
    }

    pub fn options(&self) -> &SurfaceOptions {
        &self.options
    }

    /// Replaces the state from outside (toolbar, undo, programmatic edits).
    pub fn update<D: DomTree + MutationFeed + ?Sized>(&mut self, state: EditorState, dom: &mut D) -> Vec<Effect> {
        let mut effects = Vec::new();
        self.pending = None;
        self.commit(state, dom, true, &mut effects);
        effects
    }

    pub fn handle_event<D: DomTree + MutationFeed + ?Sized>(&mut self, event: Event, dom: &mut D) -> Vec<Effect> {
        log::trace!("{:?} event {event:?}", self.mode);
        let mut effects = Vec::new();
        if let Event::ResolveTimer(task) = event {
            let result = self.composition.on_timer(task, &self.state, dom);
            self.finish_composition(result, dom, &mut effects);
            return effects;
        }
        match self.mode {
            Mode::Edit => self.handle_edit(event, dom, &mut effects),
            Mode::Composite => self.handle_composite(event, dom, &mut effects),
        }
        effects
    }

    fn handle_edit<D: DomTree + MutationFeed + ?Sized>(&mut self, event: Event, dom: &mut D, effects: &mut Vec<Effect>) {
        if !matches!(event, Event::Blur | Event::CompositionStart) {
            self.observer.start(dom);
        }
        match event {
            Event::Focus => self.sync_selection(dom, effects),
            Event::Blur => {
                self.observer.stop_and_flush_mutations(dom);
                let selection = self.state.selection().clone().with_focus(false);
                self.state = self.state.accept_selection(selection);
            }
            Event::CompositionStart => {
                self.observer.stop_and_flush_mutations(dom);
                self.pending = None;
                if self.selection_stale {
                    self.sync_selection(dom, effects);
                }
                self.mode = Mode::Composite;
                self.state = self.state.set_in_composition_mode(true);
                if let Some(cancelled) = self.composition.start(&self.state, dom) {
                    effects.push(Effect::CancelResolve(cancelled));
                }
            }
            Event::CompositionEnd => log::debug!("composition end outside a composition ignored"),
            Event::KeyDown { key, .. } => {
                if self.selection_stale {
                    self.sync_selection(dom, effects);
                }
                let cmd = match key {
                    Key::Enter => Cmd::SplitBlock,
                    Key::Backspace => Cmd::Backspace,
                    Key::Delete => Cmd::Delete,
                    key => {
                        self.selection_stale |= key.is_arrow();
                        return;
                    }
                };
                effects.push(Effect::PreventDefault);
                self.apply(cmd, dom, effects);
            }
            Event::BeforeInput { input_type, data } => {
                if self.selection_stale {
                    self.sync_selection(dom, effects);
                }
                self.before_input(input_type, data, dom, effects);
            }
            Event::Input { input_type } => self.input(input_type, dom, effects),
            Event::MouseDown => self.selection_stale = true,
            Event::KeyPress(_) | Event::DragStart => {}
            Event::KeyUp(_)
            | Event::MouseUp
            | Event::Select
            | Event::SelectionChange
            | Event::Copy
            | Event::Cut
            | Event::DragEnd => self.sync_selection(dom, effects),
            Event::ResolveTimer(_) => {}
        }
    }

    fn handle_composite<D: DomTree + MutationFeed + ?Sized>(
        &mut self,
        event: Event,
        dom: &mut D,
        effects: &mut Vec<Effect>,
    ) {
        match event {
            Event::CompositionStart => {
                if let Some(cancelled) = self.composition.start(&self.state, dom) {
                    effects.push(Effect::CancelResolve(cancelled));
                }
            }
            Event::CompositionEnd => {
                if let Some(task) = self.composition.end() {
                    effects.push(Effect::ScheduleResolve {
                        task,
                        delay: self.options.resolve_delay,
                    });
                }
            }
            Event::KeyDown { key, is_composing } => {
                let ended = self.composition.phase() == CompositionPhase::Resolving || !is_composing;
                if ended {
                    if let Some(cancelled) = self.composition.pending_task() {
                        effects.push(Effect::CancelResolve(cancelled));
                    }
                    let result = self.composition.resolve(&self.state, dom);
                    self.finish_composition(result, dom, effects);
                    if self.mode == Mode::Edit {
                        self.handle_edit(Event::KeyDown { key, is_composing }, dom, effects);
                    }
                } else if key.is_arrow() || key == Key::Enter {
                    effects.push(Effect::PreventDefault);
                }
            }
            event => log::debug!("{event:?} ignored while composing"),
        }
    }

    fn finish_composition<D: DomTree + MutationFeed + ?Sized>(
        &mut self,
        result: Result<Option<EditorState>>,
        dom: &mut D,
        effects: &mut Vec<Effect>,
    ) {
        match result {
            Ok(None) => {}
            Ok(Some(next)) => {
                self.mode = Mode::Edit;
                self.commit(next, dom, true, effects);
            }
            Err(err) => {
                log::warn!("composition could not be reconciled: {err}");
                self.mode = Mode::Edit;
                let selection = self.state.selection().clone();
                let next = self.state.set_in_composition_mode(false).force_selection(selection);
                self.commit(next, dom, true, effects);
            }
        }
    }

    fn before_input<D: DomTree + MutationFeed + ?Sized>(
        &mut self,
        input_type: InputType,
        data: Option<String>,
        dom: &mut D,
        effects: &mut Vec<Effect>,
    ) {
        let cmd = match (input_type, data) {
            (InputType::InsertText, Some(text)) => Cmd::InsertText(text),
            (InputType::InsertParagraph, _) => Cmd::SplitBlock,
            _ => return,
        };
        if let Cmd::InsertText(text) = &cmd
            && !must_prevent_native(&self.state, text)
        {
            match cmd.apply(&self.state) {
                Ok(Some(next)) => {
                    let selection = next.selection().clone();
                    self.pending = Some(next.accept_selection(selection));
                }
                Ok(None) => {}
                Err(err) => log::warn!("native insertion could not be modelled: {err}"),
            }
            return;
        }
        effects.push(Effect::PreventDefault);
        self.apply(cmd, dom, effects);
    }

    fn input<D: DomTree + MutationFeed + ?Sized>(
        &mut self,
        input_type: Option<InputType>,
        dom: &mut D,
        effects: &mut Vec<Effect>,
    ) {
        let batch = self.observer.stop_and_flush_mutations(dom);
        let pending = self.pending.take();
        let base = pending.as_ref().unwrap_or(&self.state).clone();

        let dom_selection = dom.selection();
        if !touches_only_anchor_leaf(&*dom, dom_selection.as_ref(), &batch) {
            match reconcile_leaf_mutations(&base, &*dom, self.root, &batch) {
                Ok(Some(next)) => self.commit(next, dom, true, effects),
                Ok(None) => {
                    if let Some(pending) = pending {
                        self.commit(pending, dom, false, effects);
                    }
                }
                Err(err) => self.recover(err, dom, effects),
            }
            return;
        }

        let outcome = reconcile_input(
            &base,
            &*dom,
            self.root,
            dom_selection.as_ref(),
            input_type.as_ref(),
            &self.options.quirks,
        );
        match outcome {
            Ok(InputOutcome::Unchanged) => {
                if let Some(pending) = pending {
                    self.commit(pending, dom, false, effects);
                }
            }
            Ok(InputOutcome::Reconciled(next) | InputOutcome::Restore(next)) => {
                self.commit(next, dom, true, effects)
            }
            Err(err) => self.recover(err, dom, effects),
        }
    }

    fn apply<D: DomTree + MutationFeed + ?Sized>(&mut self, cmd: Cmd, dom: &mut D, effects: &mut Vec<Effect>) {
        match cmd.apply(&self.state) {
            Ok(Some(next)) => self.commit(next, dom, true, effects),
            Ok(None) => {}
            Err(err) => log::warn!("{cmd:?} failed: {err}"),
        }
    }

    /// The DOM no longer matches anything the model can explain; redraw it.
    fn recover<D: DomTree + MutationFeed + ?Sized>(
        &mut self,
        err: crate::error::EngineError,
        dom: &mut D,
        effects: &mut Vec<Effect>,
    ) {
        log::warn!("input could not be reconciled: {err}");
        let selection = self.state.selection().clone();
        let next = self.state.force_selection(selection);
        self.commit(next, dom, true, effects);
    }

    fn sync_selection<D: DomTree + MutationFeed + ?Sized>(&mut self, dom: &mut D, effects: &mut Vec<Effect>) {
        self.selection_stale = false;
        let Some(dom_selection) = dom.selection() else {
            return;
        };
        let result = reconstruct_selection(&*dom, self.root, &dom_selection, self.state.current_content());
        if result.needs_recovery {
            self.state = self.state.force_selection(result.selection);
            self.request_render(dom, true, effects);
        } else {
            self.state = self.state.accept_selection(result.selection);
        }
    }

    fn commit<D: DomTree + MutationFeed + ?Sized>(
        &mut self,
        next: EditorState,
        dom: &mut D,
        render: bool,
        effects: &mut Vec<Effect>,
    ) {
        if next.version() != self.state.version()
            && let Some(change_type) = next.last_change_type()
        {
            effects.push(Effect::Committed {
                change_type,
                version: next.version(),
            });
        }
        let force_selection = next.must_force_selection();
        self.state = next;
        if render {
            self.request_render(dom, force_selection, effects);
        }
    }

    fn request_render<D: DomTree + MutationFeed + ?Sized>(
        &mut self,
        dom: &mut D,
        force_selection: bool,
        effects: &mut Vec<Effect>,
    ) {
        let discarded = self.observer.stop_and_flush_mutations(dom);
        if !discarded.is_empty() {
            log::trace!("discarding {} mutations ahead of render", discarded.len());
        }
        effects.push(Effect::Render { force_selection });
    }
}

/// Whether the browser must not insert `text` itself: it would place it
/// somewhere the model cannot follow leaf-for-leaf, or give it metadata
/// the model would not.
fn must_prevent_native(state: &EditorState, text: &str) -> bool {
    let selection = state.selection();
    if !selection.is_collapsed() || text.is_empty() || text.contains(['\n', '\r']) {
        return true;
    }
    let content = state.current_content();
    let Some(block) = content.block_for_key(&selection.anchor_key) else {
        return true;
    };
    if block.is_empty() {
        return true;
    }
    let chars = block.characters();
    let offset = selection.anchor_offset.min(block.length());
    if offset > 0 && offset < chars.len() && !Arc::ptr_eq(&chars[offset - 1], &chars[offset]) {
        return true;
    }
    let neighbor = &chars[offset.saturating_sub(1)];
    let expected = CharacterMetadata::create(state.current_style(), entity_for_selection(content, selection));
    !Arc::ptr_eq(&expected, neighbor)
}

/// True when native input changed at most the leaf holding the DOM
/// anchor, so reading that one leaf accounts for the whole mutation.
fn touches_only_anchor_leaf<D: DomTree + ?Sized>(
    dom: &D,
    dom_selection: Option<&DomSelection>,
    batch: &MutationBatch,
) -> bool {
    if batch.is_empty() {
        return true;
    }
    if !batch.blocks.is_empty() || batch.leaves.len() > 1 {
        return false;
    }
    let Some((key, Some(_))) = batch.leaves.iter().next() else {
        return false;
    };
    dom_selection
        .and_then(|selection| find_ancestor_offset_key(dom, selection.anchor.node))
        .is_some_and(|(leaf, anchor_key)| !is_block_root(dom, leaf) && &anchor_key == key)
}
