//! Recorded editing sessions and the virtual host that replays them.
//!
//! A trace is JSON: the starting document, an optional caret, and a list
//! of steps. Steps are either browser events handed to the surface or DOM
//! edits standing in for what the browser or an IME did natively.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use richsync_engine::{
    BlockKey, BlockRenderer, CharacterMetadata, ContentBlock, ContentState, DocumentDump, DomPoint,
    DomSelection, DomTree, EditorState, EditorSurface, Effect, Entity, EntityKey, Event, InputType,
    Key, MemoryDom, Mutability, OffsetKey, Renderer, ResolveTask, SelectionState, SurfaceOptions,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Trace {
    pub blocks: Vec<TraceBlock>,
    #[serde(default)]
    pub entities: Vec<TraceEntity>,
    #[serde(default)]
    pub caret: Option<TraceCaret>,
    pub steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
pub struct TraceBlock {
    pub key: BlockKey,
    pub text: String,
    #[serde(default, rename = "type")]
    pub block_type: Option<String>,
    #[serde(default)]
    pub depth: usize,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
    #[serde(default)]
    pub runs: Vec<TraceRun>,
}

/// Style and/or entity applied to chars `[start, end)`.
#[derive(Debug, Deserialize)]
pub struct TraceRun {
    pub start: usize,
    pub end: usize,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub entity: Option<EntityKey>,
}

#[derive(Debug, Deserialize)]
pub struct TraceEntity {
    pub key: EntityKey,
    pub kind: String,
    pub mutability: Mutability,
}

#[derive(Debug, Deserialize)]
pub struct TraceCaret {
    pub block: BlockKey,
    pub offset: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    Focus,
    Blur,
    CompositionStart,
    CompositionEnd,
    KeyDown {
        key: Key,
        #[serde(default)]
        is_composing: bool,
    },
    KeyUp {
        key: Key,
    },
    BeforeInput {
        input_type: InputType,
        #[serde(default)]
        data: Option<String>,
    },
    Input {
        #[serde(default)]
        input_type: Option<InputType>,
    },
    MouseDown,
    MouseUp,
    Select,
    SelectionChange,
    Copy,
    Cut,
    DragStart,
    DragEnd,
    /// Native edit: rewrite a leaf's text, optionally leaving the caret in it.
    SetLeafText {
        leaf: OffsetKey,
        text: String,
        #[serde(default)]
        caret: Option<usize>,
    },
    /// Move the DOM caret without an event, as the browser does.
    Caret {
        leaf: OffsetKey,
        offset: usize,
    },
    /// Native edit: detach a block's root from the editable root.
    RemoveBlock {
        block: BlockKey,
    },
    /// Advance the virtual clock, firing any resolve timers that come due.
    Wait {
        ms: u64,
    },
    Undo,
}

impl TraceBlock {
    fn to_block(&self) -> Result<ContentBlock> {
        let length = self.text.chars().count();
        let mut characters = vec![CharacterMetadata::empty(); length];
        for run in &self.runs {
            if run.start > run.end || run.end > length {
                bail!(
                    "run {}..{} is outside block {} of length {length}",
                    run.start,
                    run.end,
                    self.key
                );
            }
            for meta in &mut characters[run.start..run.end] {
                if let Some(style) = &run.style {
                    *meta = meta.apply_style(style);
                }
                if run.entity.is_some() {
                    *meta = meta.apply_entity(run.entity.clone());
                }
            }
        }
        let block = self.data.iter().fold(
            ContentBlock::with_characters(self.key.clone(), self.text.as_str(), characters).with_depth(self.depth),
            |block, (key, value)| block.with_data(key.as_str(), value.as_str()),
        );
        Ok(match &self.block_type {
            Some(block_type) => block.with_type(block_type.as_str()),
            None => block,
        })
    }
}

impl Trace {
    pub fn initial_state(&self) -> Result<EditorState> {
        let blocks = self
            .blocks
            .iter()
            .map(TraceBlock::to_block)
            .collect::<Result<Vec<_>>>()?;
        let mut content = ContentState::create_from_blocks(blocks);
        for entity in &self.entities {
            content = content.with_entity(entity.key.clone(), Entity::new(entity.kind.as_str(), entity.mutability));
        }
        let state = EditorState::create_with_content(content);
        Ok(match &self.caret {
            Some(caret) => state.accept_selection(SelectionState::collapsed(caret.block.clone(), caret.offset)),
            None => state,
        })
    }
}

/// Plays the host page: owns the DOM, renders on request and keeps a
/// virtual clock for resolve timers.
pub struct Replayer {
    surface: EditorSurface,
    dom: MemoryDom,
    renderer: BlockRenderer,
    now: Duration,
    timers: Vec<(Duration, ResolveTask)>,
    effects: Vec<Effect>,
}

impl Replayer {
    pub fn new(trace: &Trace, options: SurfaceOptions) -> Result<Self> {
        let state = trace.initial_state()?;
        let mut dom = MemoryDom::new();
        let mut renderer = BlockRenderer::new();
        renderer.render(&state, &mut dom)?;
        let surface = EditorSurface::new(state, dom.root(), options);
        Ok(Self {
            surface,
            dom,
            renderer,
            now: Duration::ZERO,
            timers: Vec::new(),
            effects: Vec::new(),
        })
    }

    pub fn run(&mut self, steps: &[Step]) -> Result<()> {
        for (index, step) in steps.iter().enumerate() {
            log::debug!("step {index} at {:?}: {step:?}", self.now);
            self.step(step).with_context(|| format!("step {index} ({step:?}) failed"))?;
        }
        Ok(())
    }

    pub fn state(&self) -> &EditorState {
        self.surface.state()
    }

    pub fn dom(&self) -> &MemoryDom {
        &self.dom
    }

    /// Every effect the surface produced, in order.
    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }

    pub fn dump(&self) -> DocumentDump {
        let state = self.state();
        DocumentDump::new(state.current_content(), state.selection())
    }

    fn step(&mut self, step: &Step) -> Result<()> {
        let event = match step.clone() {
            Step::Focus => Event::Focus,
            Step::Blur => Event::Blur,
            Step::CompositionStart => Event::CompositionStart,
            Step::CompositionEnd => Event::CompositionEnd,
            Step::KeyDown { key, is_composing } => Event::KeyDown { key, is_composing },
            Step::KeyUp { key } => Event::KeyUp(key),
            Step::BeforeInput { input_type, data } => Event::BeforeInput { input_type, data },
            Step::Input { input_type } => Event::Input { input_type },
            Step::MouseDown => Event::MouseDown,
            Step::MouseUp => Event::MouseUp,
            Step::Select => Event::Select,
            Step::SelectionChange => Event::SelectionChange,
            Step::Copy => Event::Copy,
            Step::Cut => Event::Cut,
            Step::DragStart => Event::DragStart,
            Step::DragEnd => Event::DragEnd,
            Step::SetLeafText { leaf, text, caret } => {
                let node = self
                    .dom
                    .set_leaf_text(&leaf, &text)
                    .with_context(|| format!("no leaf rendered for {leaf}"))?;
                if let Some(offset) = caret {
                    self.dom
                        .set_selection(Some(DomSelection::collapsed(DomPoint::new(node, offset))));
                }
                return Ok(());
            }
            Step::Caret { leaf, offset } => {
                let leaf_node = self
                    .dom
                    .find_leaf(&leaf)
                    .with_context(|| format!("no leaf rendered for {leaf}"))?;
                let point = match self.dom.first_text(leaf_node) {
                    Some(text) => DomPoint::new(text, offset),
                    None => DomPoint::new(leaf_node, 0),
                };
                self.dom.set_selection(Some(DomSelection::collapsed(point)));
                return Ok(());
            }
            Step::RemoveBlock { block } => {
                let node = self
                    .dom
                    .find_block(&block)
                    .with_context(|| format!("no block rendered for {block}"))?;
                self.dom.remove(node);
                return Ok(());
            }
            Step::Wait { ms } => return self.advance(Duration::from_millis(ms)),
            Step::Undo => {
                let Some(previous) = self.state().undo() else {
                    log::info!("nothing to undo");
                    return Ok(());
                };
                let effects = self.surface.update(previous, &mut self.dom);
                return self.apply_effects(effects);
            }
        };
        self.dispatch(event)
    }

    fn dispatch(&mut self, event: Event) -> Result<()> {
        let effects = self.surface.handle_event(event, &mut self.dom);
        self.apply_effects(effects)
    }

    fn apply_effects(&mut self, effects: Vec<Effect>) -> Result<()> {
        let mut render = false;
        for effect in &effects {
            match effect {
                Effect::PreventDefault => log::debug!("native action prevented"),
                Effect::ScheduleResolve { task, delay } => self.timers.push((self.now + *delay, *task)),
                Effect::CancelResolve(task) => self.timers.retain(|(_, pending)| pending != task),
                Effect::Committed { change_type, version } => {
                    log::info!("version {version}: {change_type}");
                }
                Effect::Render { .. } => render = true,
            }
        }
        if render {
            self.renderer.render(self.surface.state(), &mut self.dom)?;
        }
        self.effects.extend(effects);
        Ok(())
    }

    fn advance(&mut self, by: Duration) -> Result<()> {
        let until = self.now + by;
        loop {
            let due = self
                .timers
                .iter()
                .enumerate()
                .filter(|(_, (at, _))| *at <= until)
                .min_by_key(|(_, (at, _))| *at)
                .map(|(index, _)| index);
            let Some(index) = due else {
                break;
            };
            let (at, task) = self.timers.remove(index);
            self.now = at;
            self.dispatch(Event::ResolveTimer(task))?;
        }
        self.now = until;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use richsync_engine::ChangeType;

    fn replay(json: &str) -> Replayer {
        let trace: Trace = serde_json::from_str(json).unwrap();
        let mut replayer = Replayer::new(&trace, SurfaceOptions::default()).unwrap();
        replayer.run(&trace.steps).unwrap();
        replayer
    }

    fn commits(replayer: &Replayer) -> Vec<(ChangeType, u64)> {
        replayer
            .effects()
            .iter()
            .filter_map(|effect| match effect {
                Effect::Committed { change_type, version } => Some((*change_type, *version)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn shipped_ime_trace_resolves_once() {
        let replayer = replay(include_str!("../traces/ime-double-end.json"));

        assert_eq!(commits(&replayer), vec![(ChangeType::InsertCharacters, 1)]);
        insta::assert_snapshot!(replayer.dump().to_text(), @r"
        b1: café
        b2: [BOLD]au lait
        ");
    }

    #[test]
    fn timers_wait_for_the_clock() {
        let replayer = replay(
            r#"{
                "blocks": [{ "key": "b1", "text": "" }],
                "steps": [
                    { "op": "caret", "leaf": "b1-0-0", "offset": 0 },
                    { "op": "composition_start" },
                    { "op": "set_leaf_text", "leaf": "b1-0-0", "text": "x", "caret": 1 },
                    { "op": "composition_end" },
                    { "op": "wait", "ms": 5 }
                ]
            }"#,
        );
        assert!(commits(&replayer).is_empty());
        assert!(replayer.state().is_in_composition_mode());
    }

    #[test]
    fn typing_then_undo() {
        let replayer = replay(
            r#"{
                "blocks": [{ "key": "b1", "text": "helloworld" }],
                "caret": { "block": "b1", "offset": 10 },
                "steps": [
                    { "op": "caret", "leaf": "b1-0-0", "offset": 10 },
                    { "op": "focus" },
                    { "op": "set_leaf_text", "leaf": "b1-0-0", "text": "hello world", "caret": 11 },
                    { "op": "input", "input_type": "insertText" },
                    { "op": "undo" }
                ]
            }"#,
        );
        assert_eq!(commits(&replayer), vec![(ChangeType::ApplyEntity, 1)]);
        assert_eq!(replayer.state().current_content().plain_text("|"), "helloworld");
        assert_eq!(replayer.state().version(), 2);
        assert_eq!(
            replayer.dom().inner_html(),
            r#"<div data-block="true" data-offset-key="b1-0-0"><span data-offset-key="b1-0-0"><span data-text="true">helloworld</span></span></div>"#
        );
    }

    #[test]
    fn runs_outside_the_block_are_rejected() {
        let trace: Trace = serde_json::from_str(
            r#"{
                "blocks": [{ "key": "b1", "text": "ab", "runs": [{ "start": 1, "end": 5, "style": "BOLD" }] }],
                "steps": []
            }"#,
        )
        .unwrap();
        let err = Replayer::new(&trace, SurfaceOptions::default()).err().unwrap();
        assert!(err.to_string().contains("outside block b1"));
    }

    #[test]
    fn entities_and_types_are_loaded() {
        let trace: Trace = serde_json::from_str(
            r#"{
                "blocks": [{ "key": "b1", "text": "see docs", "type": "header-two",
                             "runs": [{ "start": 4, "end": 8, "entity": "e1" }] }],
                "entities": [{ "key": "e1", "kind": "LINK", "mutability": "MUTABLE" }],
                "steps": []
            }"#,
        )
        .unwrap();
        let state = trace.initial_state().unwrap();
        let content = state.current_content();
        let block = content.first_block();

        assert_eq!(block.block_type(), "header-two");
        assert_eq!(block.entity_at(5), Some(&EntityKey::from("e1")));
        assert!(content.entity(&EntityKey::from("e1")).is_some_and(Entity::is_mutable));
    }

    #[test]
    fn block_depth_and_data_are_loaded_and_rendered() {
        let replayer = replay(
            r#"{
                "blocks": [
                    { "key": "b1", "text": "top", "type": "unordered-list-item" },
                    { "key": "b2", "text": "nested", "type": "unordered-list-item",
                      "depth": 1, "data": { "checked": "true" } }
                ],
                "steps": []
            }"#,
        );
        let content = replayer.state().current_content();
        let nested = content.block_for_key(&BlockKey::from("b2")).unwrap();

        assert_eq!(content.first_block().depth(), 0);
        assert_eq!(nested.depth(), 1);
        assert_eq!(nested.data().get("checked").map(String::as_str), Some("true"));
        assert!(replayer.dom().inner_html().contains(r#"data-depth="1""#));
    }
}
