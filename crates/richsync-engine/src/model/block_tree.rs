//! Leaf layout of a rendered block.
//!
//! A block renders as a list of decorator ranges, each split into leaves
//! of identical character metadata. The `(decorator index, leaf index)`
//! pair, together with the block key, is what an [`OffsetKey`] addresses.

use std::fmt;
use std::ops::Range;

use serde::Serialize;

use crate::model::block::{ContentBlock, find_ranges};
use crate::model::content::ContentState;
use crate::offset_key::OffsetKey;

/// Char range `[start, end)` covered by one leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LeafRange {
    pub start: usize,
    pub end: usize,
}

impl LeafRange {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl From<Range<usize>> for LeafRange {
    fn from(range: Range<usize>) -> Self {
        Self {
            start: range.start,
            end: range.end,
        }
    }
}

/// Run of chars wrapped by the same decorator (or by none).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoratorRange {
    pub start: usize,
    pub end: usize,
    pub decorator: Option<String>,
    pub leaves: Vec<LeafRange>,
}

/// Assigns decorator components to chars of a block.
pub trait Decorator: fmt::Debug + Send + Sync {
    /// One entry per char of `block`; `Some(name)` wraps that char in the
    /// named decorator.
    fn decorations(&self, block: &ContentBlock, content: &ContentState) -> Vec<Option<String>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockTree {
    ranges: Vec<DecoratorRange>,
}

impl BlockTree {
    pub fn generate(
        content: &ContentState,
        block: &ContentBlock,
        decorator: Option<&dyn Decorator>,
    ) -> Self {
        if block.is_empty() {
            return Self {
                ranges: vec![DecoratorRange {
                    start: 0,
                    end: 0,
                    decorator: None,
                    leaves: vec![LeafRange { start: 0, end: 0 }],
                }],
            };
        }

        let length = block.length();
        let mut decorations = decorator
            .map(|d| d.decorations(block, content))
            .unwrap_or_else(|| vec![None; length]);
        if decorations.len() != length {
            log::warn!(
                "decorator returned {} entries for block {} of length {length}; ignoring it",
                decorations.len(),
                block.key()
            );
            decorations = vec![None; length];
        }

        let ranges = find_ranges(&decorations, |a, b| a == b)
            .into_iter()
            .map(|run| DecoratorRange {
                start: run.start,
                end: run.end,
                decorator: decorations[run.start].clone(),
                leaves: block
                    .find_leaf_runs(run.clone())
                    .into_iter()
                    .map(LeafRange::from)
                    .collect(),
            })
            .collect();
        Self { ranges }
    }

    pub fn ranges(&self) -> &[DecoratorRange] {
        &self.ranges
    }

    pub fn leaf(&self, decorator_key: usize, leaf_key: usize) -> Option<LeafRange> {
        self.ranges
            .get(decorator_key)
            .and_then(|range| range.leaves.get(leaf_key))
            .copied()
    }

    /// Every leaf with its offset key, in document order.
    pub fn leaves<'a>(
        &'a self,
        block: &'a ContentBlock,
    ) -> impl Iterator<Item = (OffsetKey, LeafRange)> + 'a {
        self.ranges.iter().enumerate().flat_map(move |(decorator_key, range)| {
            range.leaves.iter().enumerate().map(move |(leaf_key, leaf)| {
                (
                    OffsetKey::new(block.key().clone(), decorator_key, leaf_key),
                    *leaf,
                )
            })
        })
    }

    /// Leaf holding the caret position `offset`. A position on a boundary
    /// belongs to the leaf that ends there.
    pub fn leaf_at(&self, offset: usize) -> Option<(usize, usize, LeafRange)> {
        let mut last = None;
        for (decorator_key, range) in self.ranges.iter().enumerate() {
            for (leaf_key, leaf) in range.leaves.iter().enumerate() {
                if leaf.start <= offset && offset <= leaf.end {
                    return Some((decorator_key, leaf_key, *leaf));
                }
                last = Some((decorator_key, leaf_key, *leaf));
            }
        }
        last
    }
}
