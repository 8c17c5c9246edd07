#![allow(dead_code)]

use richsync_engine::{
    BlockKey, BlockRenderer, ContentBlock, ContentState, DomPoint, DomSelection, EditorState,
    EditorSurface, Effect, Event, MemoryDom, NodeId, OffsetKey, Renderer, SelectionState,
    SurfaceOptions,
};

/// Plays the host: owns the DOM, renders whenever the surface asks.
pub struct Harness {
    pub surface: EditorSurface,
    pub dom: MemoryDom,
    pub renderer: BlockRenderer,
}

impl Harness {
    pub fn new(state: EditorState) -> Self {
        Self::with_options(state, SurfaceOptions::default())
    }

    pub fn with_options(state: EditorState, options: SurfaceOptions) -> Self {
        let mut dom = MemoryDom::new();
        let mut renderer = BlockRenderer::new();
        renderer.render(&state, &mut dom).unwrap();
        let surface = EditorSurface::new(state, richsync_engine::DomTree::root(&dom), options);
        Self {
            surface,
            dom,
            renderer,
        }
    }

    pub fn send(&mut self, event: Event) -> Vec<Effect> {
        let effects = self.surface.handle_event(event, &mut self.dom);
        if effects.iter().any(|effect| matches!(effect, Effect::Render { .. })) {
            self.renderer.render(self.surface.state(), &mut self.dom).unwrap();
        }
        effects
    }

    pub fn state(&self) -> &EditorState {
        self.surface.state()
    }

    pub fn text(&self) -> String {
        self.state().current_content().plain_text("|")
    }

    pub fn leaf_text_node(&self, block: &str, decorator: usize, leaf: usize) -> NodeId {
        let leaf = self
            .dom
            .find_leaf(&OffsetKey::new(BlockKey::from(block), decorator, leaf))
            .unwrap();
        self.dom.first_text(leaf).unwrap()
    }

    /// Puts the DOM caret inside a leaf's text node, or on the leaf itself
    /// when it only holds the empty-block placeholder.
    pub fn place_caret(&mut self, block: &str, leaf: usize, offset: usize) {
        let key = OffsetKey::new(BlockKey::from(block), 0, leaf);
        let leaf = self.dom.find_leaf(&key).unwrap();
        let point = match self.dom.first_text(leaf) {
            Some(text) => DomPoint::new(text, offset),
            None => DomPoint::new(leaf, 0),
        };
        self.dom.set_selection(Some(DomSelection::collapsed(point)));
    }

    /// What the browser does on native typing: rewrite a leaf and leave
    /// the caret at `caret` inside it.
    pub fn type_into(&mut self, block: &str, leaf: usize, text: &str, caret: usize) {
        let key = OffsetKey::new(BlockKey::from(block), 0, leaf);
        let node = self.dom.set_leaf_text(&key, text).unwrap();
        self.dom
            .set_selection(Some(DomSelection::collapsed(DomPoint::new(node, caret))));
    }
}

pub fn blocks(lines: &[(&str, &str)]) -> ContentState {
    ContentState::create_from_blocks(
        lines
            .iter()
            .map(|(key, text)| ContentBlock::new(BlockKey::from(*key), *text))
            .collect(),
    )
}

pub fn caret(block: &str, offset: usize) -> SelectionState {
    SelectionState::collapsed(BlockKey::from(block), offset)
}
