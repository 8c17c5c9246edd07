//! Serializable, human-readable view of a document version, used by the
//! replay tool and by snapshot tests.

use std::fmt::Write;

use serde::Serialize;

use crate::model::content::ContentState;
use crate::model::entity::Mutability;
use crate::model::selection_state::SelectionState;

#[derive(Debug, Serialize)]
pub struct DocumentDump {
    pub blocks: Vec<BlockDump>,
    pub entities: Vec<EntityDump>,
    pub selection: SelectionState,
}

#[derive(Debug, Serialize)]
pub struct BlockDump {
    pub key: String,
    pub block_type: String,
    pub depth: usize,
    pub text: String,
    pub runs: Vec<RunDump>,
}

/// A run of identical metadata.
#[derive(Debug, Serialize)]
pub struct RunDump {
    pub start: usize,
    pub end: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub styles: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EntityDump {
    pub key: String,
    pub kind: String,
    pub mutability: Mutability,
}

impl DocumentDump {
    pub fn new(content: &ContentState, selection: &SelectionState) -> Self {
        let blocks = content
            .blocks()
            .iter()
            .map(|block| BlockDump {
                key: block.key().to_string(),
                block_type: block.block_type().to_string(),
                depth: block.depth(),
                text: block.text().to_string(),
                runs: block
                    .find_leaf_runs(0..block.length())
                    .into_iter()
                    .map(|run| {
                        let meta = &block.characters()[run.start];
                        RunDump {
                            start: run.start,
                            end: run.end,
                            styles: meta.style().iter().map(str::to_string).collect(),
                            entity: meta.entity().map(|key| key.to_string()),
                        }
                    })
                    .collect(),
            })
            .collect();
        let entities = content
            .entity_map()
            .iter()
            .map(|(key, entity)| EntityDump {
                key: key.to_string(),
                kind: entity.kind.clone(),
                mutability: entity.mutability,
            })
            .collect();
        Self {
            blocks,
            entities,
            selection: selection.clone(),
        }
    }

    /// One line per block, runs rendered inline:
    /// `b1: hello [BOLD]world{e1}`.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for block in &self.blocks {
            let _ = write!(out, "{}:", block.key);
            if !block.runs.is_empty() {
                out.push(' ');
            }
            let chars: Vec<char> = block.text.chars().collect();
            for run in &block.runs {
                let text: String = chars[run.start..run.end].iter().collect();
                if !run.styles.is_empty() {
                    let _ = write!(out, "[{}]", run.styles.join(","));
                }
                out.push_str(&text);
                if let Some(entity) = &run.entity {
                    let _ = write!(out, "{{{entity}}}");
                }
            }
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::block::{BlockKey, ContentBlock};
    use crate::model::character::{CharacterMetadata, EntityKey};

    #[test]
    fn text_dump_marks_styles_and_entities() {
        let plain = CharacterMetadata::empty();
        let bold = plain.apply_style("BOLD");
        let linked = plain.apply_entity(Some(EntityKey::from("e1")));
        let block = ContentBlock::with_characters(
            BlockKey::from("b1"),
            "abcd",
            vec![bold.clone(), bold, plain, linked],
        );
        let content = ContentState::create_from_blocks(vec![block, ContentBlock::new(BlockKey::from("b2"), "")]);
        let dump = DocumentDump::new(&content, content.selection_after());

        insta::assert_snapshot!(dump.to_text(), @r"
        b1: [BOLD]abcd{e1}
        b2:
        ");
    }
}
