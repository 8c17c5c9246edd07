use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::character::{CharacterMetadata, EntityKey, StyleSet};

/// Block type used when nothing more specific applies.
pub const UNSTYLED: &str = "unstyled";

const GENERATED_KEY_LEN: usize = 12;

/// Unique identifier of a block within a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockKey(String);

impl BlockKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Random key drawn from a v4 uuid.
    pub fn generate() -> Self {
        let simple = Uuid::new_v4().simple().to_string();
        Self(simple[..GENERATED_KEY_LEN].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for BlockKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl fmt::Display for BlockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Byte offset of the `index`-th char of `text`, or `text.len()` past the end.
pub(crate) fn char_to_byte(text: &str, index: usize) -> usize {
    text.char_indices()
        .nth(index)
        .map(|(byte, _)| byte)
        .unwrap_or(text.len())
}

/// A paragraph-level unit of the document.
///
/// Offsets are counted in chars. `characters` always holds exactly one
/// metadata entry per char of `text`.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentBlock {
    key: BlockKey,
    block_type: String,
    text: String,
    characters: Vec<Arc<CharacterMetadata>>,
    depth: usize,
    data: BTreeMap<String, String>,
}

impl ContentBlock {
    /// Unstyled block whose characters all carry empty metadata.
    pub fn new(key: BlockKey, text: impl Into<String>) -> Self {
        let text = text.into();
        let empty = CharacterMetadata::empty();
        let characters = text.chars().map(|_| empty.clone()).collect();
        Self::with_characters(key, text, characters)
    }

    pub fn with_characters(
        key: BlockKey,
        text: impl Into<String>,
        characters: Vec<Arc<CharacterMetadata>>,
    ) -> Self {
        let text = text.into();
        assert_eq!(
            text.chars().count(),
            characters.len(),
            "block {key}: character list must match text length"
        );
        Self {
            key,
            block_type: UNSTYLED.to_string(),
            text,
            characters,
            depth: 0,
            data: BTreeMap::new(),
        }
    }

    pub fn with_type(mut self, block_type: impl Into<String>) -> Self {
        self.block_type = block_type.into();
        self
    }

    pub fn with_depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Same key, type, depth and data with new text and characters.
    pub fn with_content(
        &self,
        text: impl Into<String>,
        characters: Vec<Arc<CharacterMetadata>>,
    ) -> Self {
        let mut block = Self::with_characters(self.key.clone(), text, characters);
        block.block_type = self.block_type.clone();
        block.depth = self.depth;
        block.data = self.data.clone();
        block
    }

    /// Same content under a different key.
    pub fn with_key(&self, key: BlockKey) -> Self {
        let mut block = self.clone();
        block.key = key;
        block
    }

    pub fn key(&self) -> &BlockKey {
        &self.key
    }

    pub fn block_type(&self) -> &str {
        &self.block_type
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn characters(&self) -> &[Arc<CharacterMetadata>] {
        &self.characters
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn data(&self) -> &BTreeMap<String, String> {
        &self.data
    }

    /// Length in chars.
    pub fn length(&self) -> usize {
        self.characters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.characters.is_empty()
    }

    pub fn metadata_at(&self, offset: usize) -> Option<&Arc<CharacterMetadata>> {
        self.characters.get(offset)
    }

    pub fn style_at(&self, offset: usize) -> StyleSet {
        self.metadata_at(offset)
            .map(|meta| meta.style().clone())
            .unwrap_or_default()
    }

    pub fn entity_at(&self, offset: usize) -> Option<&EntityKey> {
        self.metadata_at(offset).and_then(|meta| meta.entity())
    }

    /// Text of the char range `range`, clamped to the block.
    pub fn text_slice(&self, range: Range<usize>) -> &str {
        let end = range.end.min(self.length());
        let start = range.start.min(end);
        &self.text[char_to_byte(&self.text, start)..char_to_byte(&self.text, end)]
    }

    /// Replaces `[start, end)` with `new_text`, every new char carrying the
    /// metadata built from `style` and `entity`. Positions outside the range
    /// keep their existing metadata instances.
    pub fn replace_text_range(
        &self,
        start: usize,
        end: usize,
        new_text: &str,
        style: &StyleSet,
        entity: Option<&EntityKey>,
    ) -> Self {
        let meta = CharacterMetadata::create(style.clone(), entity.cloned());
        self.splice(start, end, new_text, std::iter::repeat_n(meta, new_text.chars().count()))
    }

    /// Removes `[start, end)`.
    pub fn remove_text_range(&self, start: usize, end: usize) -> Self {
        self.splice(start, end, "", std::iter::empty())
    }

    fn splice(
        &self,
        start: usize,
        end: usize,
        new_text: &str,
        metadata: impl Iterator<Item = Arc<CharacterMetadata>>,
    ) -> Self {
        assert!(
            start <= end && end <= self.length(),
            "range {start}..{end} out of bounds for block {} of length {}",
            self.key,
            self.length()
        );
        let start_byte = char_to_byte(&self.text, start);
        let end_byte = char_to_byte(&self.text, end);

        let mut text = String::with_capacity(self.text.len() + new_text.len());
        text.push_str(&self.text[..start_byte]);
        text.push_str(new_text);
        text.push_str(&self.text[end_byte..]);

        let mut characters = Vec::with_capacity(self.characters.len() + new_text.len());
        characters.extend_from_slice(&self.characters[..start]);
        characters.extend(metadata);
        characters.extend_from_slice(&self.characters[end..]);

        self.with_content(text, characters)
    }

    /// Maximal runs of equal style sets.
    pub fn find_style_runs(&self) -> Vec<Range<usize>> {
        find_ranges(&self.characters, |a, b| a.style() == b.style())
    }

    /// Maximal runs of equal entity keys (including runs without an entity).
    pub fn find_entity_runs(&self) -> Vec<Range<usize>> {
        find_ranges(&self.characters, |a, b| a.entity() == b.entity())
    }

    /// Maximal runs of identical metadata; these are the block's leaves.
    pub fn find_leaf_runs(&self, range: Range<usize>) -> Vec<Range<usize>> {
        find_ranges(&self.characters[range.clone()], |a, b| Arc::ptr_eq(a, b))
            .into_iter()
            .map(|run| run.start + range.start..run.end + range.start)
            .collect()
    }
}

/// Splits `items` into maximal runs where consecutive items compare equal.
///
/// Each position is compared with its predecessor and a run is closed on
/// every boundary, so the runs tile the whole slice.
pub fn find_ranges<T>(items: &[T], same: impl Fn(&T, &T) -> bool) -> Vec<Range<usize>> {
    let mut runs = Vec::new();
    let Some(first) = items.first() else {
        return runs;
    };
    let mut run_start = 0;
    let mut previous = first;
    for (index, item) in items.iter().enumerate().skip(1) {
        if !same(previous, item) {
            runs.push(run_start..index);
            run_start = index;
        }
        previous = item;
    }
    runs.push(run_start..items.len());
    runs
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::collections::HashSet;

    fn styled(text: &str, styles: &[&[&str]]) -> ContentBlock {
        let characters = styles
            .iter()
            .map(|s| CharacterMetadata::create(StyleSet::from_iter(s.iter().copied()), None))
            .collect();
        ContentBlock::with_characters(BlockKey::from("b1"), text, characters)
    }

    #[rstest]
    #[case(&[], vec![])]
    #[case(&[&[] as &[&str]], vec![0..1])]
    #[case(&[&["BOLD"] as &[&str], &["BOLD"], &[]], vec![0..2, 2..3])]
    #[case(&[&[] as &[&str], &["BOLD"], &[], &[]], vec![0..1, 1..2, 2..4])]
    #[case(&[&["BOLD", "ITALIC"] as &[&str], &["ITALIC", "BOLD"]], vec![0..2])]
    fn style_runs_are_maximal_and_cover_block(
        #[case] styles: &[&[&str]],
        #[case] expected: Vec<Range<usize>>,
    ) {
        let text: String = "x".repeat(styles.len());
        let block = styled(&text, styles);
        let runs = block.find_style_runs();
        assert_eq!(runs, expected);

        let mut cursor = 0;
        for run in &runs {
            assert_eq!(run.start, cursor);
            assert!(run.start < run.end);
            cursor = run.end;
        }
        assert_eq!(cursor, block.length());
        for pair in runs.windows(2) {
            let last = &block.characters()[pair[0].end - 1];
            let next = &block.characters()[pair[1].start];
            assert_ne!(last.style(), next.style());
        }
    }

    #[test]
    fn entity_runs_ignore_style() {
        let e1 = Some(EntityKey::from("e1"));
        let characters = vec![
            CharacterMetadata::create(StyleSet::from_iter(["BOLD"]), None),
            CharacterMetadata::create(StyleSet::new(), None),
            CharacterMetadata::create(StyleSet::new(), e1.clone()),
            CharacterMetadata::create(StyleSet::from_iter(["BOLD"]), e1),
        ];
        let block = ContentBlock::with_characters(BlockKey::from("b1"), "abcd", characters);
        assert_eq!(block.find_entity_runs(), vec![0..2, 2..4]);
        assert_eq!(block.find_style_runs(), vec![0..1, 1..3, 3..4]);
    }

    #[test]
    fn replace_text_range_keeps_untouched_metadata_by_reference() {
        let block = styled("abcdef", &[&["BOLD"], &["BOLD"], &[], &[], &["ITALIC"], &["ITALIC"]]);
        let replaced = block.replace_text_range(2, 4, "XYZ", &StyleSet::new(), None);

        assert_eq!(replaced.text(), "abXYZef");
        assert_eq!(replaced.length(), 7);
        for (old, new) in [(0, 0), (1, 1), (4, 5), (5, 6)] {
            assert!(Arc::ptr_eq(&block.characters()[old], &replaced.characters()[new]));
        }
        assert_eq!(replaced.key(), block.key());
    }

    #[test]
    fn replace_text_range_counts_chars_not_bytes() {
        let block = ContentBlock::new(BlockKey::from("b1"), "cafe");
        let replaced = block.replace_text_range(3, 4, "é", &StyleSet::new(), None);
        assert_eq!(replaced.text(), "café");
        assert_eq!(replaced.length(), 4);
        assert_eq!(replaced.text_slice(2..4), "fé");
    }

    #[test]
    #[should_panic(expected = "character list must match text length")]
    fn mismatched_character_list_is_rejected() {
        ContentBlock::with_characters(BlockKey::from("b1"), "abc", vec![CharacterMetadata::empty()]);
    }

    #[test]
    fn generated_keys_are_unique() {
        let keys: HashSet<BlockKey> = (0..10_000).map(|_| BlockKey::generate()).collect();
        assert_eq!(keys.len(), 10_000);
        assert!(keys
            .iter()
            .all(|key| key.as_str().len() == GENERATED_KEY_LEN
                && key.as_str().chars().all(|c| c.is_ascii_hexdigit())));
    }
}
