//! Reference rendering collaborator.
//!
//! Produces the addressed DOM the reconcilers rely on:
//!
//! ```text
//! <div data-block="true" data-offset-key="b1-0-0">
//!   <span data-offset-key="b1-0-0" style="font-weight: bold">
//!     <span data-text="true">hello</span>
//!   </span>
//!   <span data-decorator="hashtag">
//!     <span data-offset-key="b1-1-0"><span data-text="true">#tag</span></span>
//!   </span>
//! </div>
//! ```
//!
//! An empty leaf renders `<br data-text="true">` instead of a text span.

use std::collections::HashMap;
use std::sync::Arc;

use crate::dom::query::{text_content, trim_soft_newline};
use crate::dom::{
    BLOCK_ATTR, DECORATOR_ATTR, DomPoint, DomSelection, DomTree, ENTITY_ATTR, MemoryDom, NodeId,
    OFFSET_KEY_ATTR, TEXT_ATTR,
};
use crate::error::{EngineError, Result};
use crate::model::block::{BlockKey, ContentBlock};
use crate::model::block_tree::BlockTree;
use crate::model::character::StyleSet;
use crate::model::editor_state::EditorState;
use crate::offset_key::OffsetKey;

pub trait Renderer {
    type Dom: DomTree;

    /// Brings the DOM in line with `state`, and moves the DOM selection
    /// when the state asks for it.
    fn render(&mut self, state: &EditorState, dom: &mut Self::Dom) -> Result<()>;
}

#[derive(Debug)]
struct Rendered {
    block: Arc<ContentBlock>,
    tree: BlockTree,
    node: NodeId,
}

/// Renders every block as a `div`-like root with one span per leaf.
/// Blocks whose model, layout and DOM text are unchanged since the last
/// render keep their nodes.
#[derive(Debug, Default)]
pub struct BlockRenderer {
    rendered: HashMap<BlockKey, Rendered>,
}

impl BlockRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_current(&self, dom: &MemoryDom, block: &Arc<ContentBlock>, tree: &BlockTree) -> Option<NodeId> {
        let cached = self.rendered.get(block.key())?;
        let intact = Arc::ptr_eq(&cached.block, block)
            && cached.tree == *tree
            && dom.parent(cached.node) == Some(dom.root())
            && trim_soft_newline(&text_content(dom, cached.node)) == block.text();
        intact.then_some(cached.node)
    }

    fn render_block(&self, dom: &mut MemoryDom, block: &ContentBlock, tree: &BlockTree) -> NodeId {
        let key = block.key();
        let block_offset_key = OffsetKey::for_block(key.clone()).encode();
        let root = dom.create_element(
            block_tag(block.block_type()),
            &[(BLOCK_ATTR, "true"), (OFFSET_KEY_ATTR, &block_offset_key)],
        );
        if block.depth() > 0 {
            dom.set_attribute(root, "data-depth", &block.depth().to_string());
        }

        let last_decorator = tree.ranges().len().saturating_sub(1);
        for (decorator_key, range) in tree.ranges().iter().enumerate() {
            let parent = match &range.decorator {
                Some(name) => {
                    let span = dom.create_element("span", &[(DECORATOR_ATTR, name)]);
                    dom.append_child(root, span);
                    span
                }
                None => root,
            };
            for (leaf_key, leaf) in range.leaves.iter().enumerate() {
                let offset_key = OffsetKey::new(key.clone(), decorator_key, leaf_key).encode();
                let span = dom.create_element("span", &[(OFFSET_KEY_ATTR, &offset_key)]);
                dom.append_child(parent, span);

                if leaf.is_empty() {
                    let br = dom.create_element("br", &[(TEXT_ATTR, "true")]);
                    dom.append_child(span, br);
                    continue;
                }

                let meta = &block.characters()[leaf.start];
                if let Some(style) = inline_style(meta.style()) {
                    dom.set_attribute(span, "style", &style);
                }
                if let Some(entity) = meta.entity() {
                    dom.set_attribute(span, ENTITY_ATTR, entity.as_str());
                }

                let mut text = block.text_slice(leaf.start..leaf.end).to_string();
                let is_last = decorator_key == last_decorator && leaf_key + 1 == range.leaves.len();
                if is_last && text.ends_with('\n') {
                    text.push('\n');
                }
                let text_span = dom.create_element("span", &[(TEXT_ATTR, "true")]);
                let node = dom.create_text(&text);
                dom.append_child(text_span, node);
                dom.append_child(span, text_span);
            }
        }
        root
    }

    fn dom_point(&self, state: &EditorState, dom: &MemoryDom, key: &BlockKey, offset: usize) -> Result<DomPoint> {
        let tree = state
            .block_tree(key)
            .ok_or_else(|| EngineError::UnknownBlock(key.clone()))?;
        let (decorator_key, leaf_key, leaf) = tree
            .leaf_at(offset)
            .ok_or_else(|| EngineError::UnknownBlock(key.clone()))?;
        let offset_key = OffsetKey::new(key.clone(), decorator_key, leaf_key);
        let leaf_node = dom
            .find_leaf(&offset_key)
            .ok_or(EngineError::MissingLeaf(offset_key))?;
        Ok(match dom.first_text(leaf_node) {
            Some(text) => DomPoint::new(text, offset - leaf.start),
            None => DomPoint::new(leaf_node, 0),
        })
    }
}

impl Renderer for BlockRenderer {
    type Dom = MemoryDom;

    fn render(&mut self, state: &EditorState, dom: &mut MemoryDom) -> Result<()> {
        let content = state.current_content();
        let mut nodes = Vec::with_capacity(content.block_count());
        let mut rendered = HashMap::with_capacity(content.block_count());

        for block in content.blocks() {
            let tree = state
                .block_tree(block.key())
                .ok_or_else(|| EngineError::UnknownBlock(block.key().clone()))?;
            let node = match self.is_current(dom, block, tree) {
                Some(node) => node,
                None => self.render_block(dom, block, tree),
            };
            nodes.push(node);
            rendered.insert(
                block.key().clone(),
                Rendered {
                    block: block.clone(),
                    tree: tree.clone(),
                    node,
                },
            );
        }

        let root = dom.root();
        if dom.children(root) != nodes.as_slice() {
            dom.replace_children(root, nodes);
        }
        self.rendered = rendered;
        log::trace!("rendered version {}", state.version());

        if state.must_force_selection() {
            let selection = state.selection();
            let anchor = self.dom_point(state, dom, &selection.anchor_key, selection.anchor_offset)?;
            let focus = self.dom_point(state, dom, &selection.focus_key, selection.focus_offset)?;
            dom.set_selection(Some(DomSelection { anchor, focus }));
        }
        Ok(())
    }
}

fn block_tag(block_type: &str) -> &'static str {
    match block_type {
        "header-one" => "h1",
        "header-two" => "h2",
        "header-three" => "h3",
        "header-four" => "h4",
        "header-five" => "h5",
        "header-six" => "h6",
        "blockquote" => "blockquote",
        "code-block" => "pre",
        "unordered-list-item" | "ordered-list-item" => "li",
        _ => "div",
    }
}

fn inline_style(style: &StyleSet) -> Option<String> {
    let declarations: Vec<&str> = style
        .iter()
        .filter_map(|name| match name {
            "BOLD" => Some("font-weight: bold"),
            "ITALIC" => Some("font-style: italic"),
            "UNDERLINE" => Some("text-decoration: underline"),
            "STRIKETHROUGH" => Some("text-decoration: line-through"),
            "CODE" => Some("font-family: monospace"),
            _ => None,
        })
        .collect();
    (!declarations.is_empty()).then(|| declarations.join("; "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::block_tree::Decorator;
    use crate::model::character::{CharacterMetadata, EntityKey};
    use crate::model::content::ContentState;
    use crate::model::selection_state::SelectionState;
    use crate::model::editor_state::ChangeType;
    use crate::model::modifier;

    fn state() -> EditorState {
        let plain = CharacterMetadata::empty();
        let bold = plain.apply_style("BOLD");
        let linked = plain.apply_entity(Some(EntityKey::from("e1")));
        let first = ContentBlock::with_characters(
            BlockKey::from("b1"),
            "hi you",
            vec![bold.clone(), bold, plain.clone(), plain, linked.clone(), linked],
        );
        let second = ContentBlock::new(BlockKey::from("b2"), "").with_type("header-one");
        EditorState::create_with_content(ContentState::create_from_blocks(vec![first, second]))
    }

    #[test]
    fn renders_addressed_blocks_and_leaves() {
        let mut dom = MemoryDom::new();
        BlockRenderer::new().render(&state(), &mut dom).unwrap();

        insta::assert_snapshot!(dom.inner_html(), @r#"<div data-block="true" data-offset-key="b1-0-0"><span data-offset-key="b1-0-0" style="font-weight: bold"><span data-text="true">hi</span></span><span data-offset-key="b1-0-1"><span data-text="true"> y</span></span><span data-offset-key="b1-0-2" data-entity="e1"><span data-text="true">ou</span></span></div><h1 data-block="true" data-offset-key="b2-0-0"><span data-offset-key="b2-0-0"><br data-text="true"></span></h1>"#);
    }

    #[test]
    fn unchanged_blocks_keep_their_nodes() {
        let mut dom = MemoryDom::new();
        let mut renderer = BlockRenderer::new();
        let state = state();
        renderer.render(&state, &mut dom).unwrap();
        let before = dom.children(dom.root()).to_vec();

        let caret = SelectionState::collapsed(BlockKey::from("b2"), 0);
        let content = modifier::insert_text(state.current_content(), &caret, "x", &StyleSet::new(), None).unwrap();
        let next = state.push(content, ChangeType::InsertCharacters, true);
        renderer.render(&next, &mut dom).unwrap();
        let after = dom.children(dom.root()).to_vec();

        assert_eq!(before[0], after[0]);
        assert_ne!(before[1], after[1]);
        let selection = dom.selection().unwrap();
        assert_eq!(dom.text(selection.anchor.node), Some("x"));
        assert_eq!(selection.anchor.offset, 1);
    }

    #[test]
    fn drifted_dom_is_rerendered() {
        let mut dom = MemoryDom::new();
        let mut renderer = BlockRenderer::new();
        let state = state();
        renderer.render(&state, &mut dom).unwrap();
        dom.set_leaf_text(&OffsetKey::new(BlockKey::from("b1"), 0, 0), "HI");
        renderer.render(&state, &mut dom).unwrap();

        let leaf = dom.find_leaf(&OffsetKey::new(BlockKey::from("b1"), 0, 0)).unwrap();
        assert_eq!(text_content(&dom, leaf), "hi");
    }

    #[derive(Debug)]
    struct Everything;

    impl Decorator for Everything {
        fn decorations(&self, block: &ContentBlock, _: &ContentState) -> Vec<Option<String>> {
            vec![Some("all".to_string()); block.length()]
        }
    }

    #[test]
    fn decorated_leaves_sit_inside_a_decorator_span() {
        let mut dom = MemoryDom::new();
        let state = EditorState::create_with_content(ContentState::create_from_blocks(vec![
            ContentBlock::new(BlockKey::from("b1"), "ab\n"),
        ]))
        .with_decorator(Arc::new(Everything));
        BlockRenderer::new().render(&state, &mut dom).unwrap();

        let block = dom.children(dom.root())[0];
        let decorator = dom.children(block)[0];
        assert_eq!(dom.attribute(decorator, DECORATOR_ATTR), Some("all"));
        assert_eq!(text_content(&dom, block), "ab\n\n");
        assert_eq!(trim_soft_newline(&text_content(&dom, block)), "ab\n");
    }
}
