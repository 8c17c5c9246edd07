//! Coalesces raw DOM mutation records into per-address changes.

use std::collections::BTreeMap;

use crate::dom::query::{block_key_of, find_ancestor_block, find_ancestor_offset_key, is_block_root, text_content};
use crate::dom::{DomTree, MutationFeed, MutationKind, MutationRecord, NodeId, OFFSET_KEY_ATTR};
use crate::model::block::BlockKey;
use crate::offset_key::OffsetKey;

/// Address granularity a [`DomObserver`] records at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserveMode {
    /// `OffsetKey -> Some(leaf text) | None` (leaf removed).
    Leaf,
    /// `BlockKey -> Some(block root) | None` (block removed).
    Block,
}

/// Changes drained from one observation window. Later notifications for an
/// address overwrite earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationBatch {
    pub leaves: BTreeMap<OffsetKey, Option<String>>,
    pub blocks: BTreeMap<BlockKey, Option<NodeId>>,
}

impl MutationBatch {
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty() && self.blocks.is_empty()
    }

    /// Number of distinct addresses touched.
    pub fn len(&self) -> usize {
        self.leaves.len() + self.blocks.len()
    }
}

#[derive(Debug)]
pub struct DomObserver {
    mode: ObserveMode,
    root: NodeId,
    observing: bool,
    batch: MutationBatch,
}

impl DomObserver {
    pub fn new(root: NodeId, mode: ObserveMode) -> Self {
        Self {
            mode,
            root,
            observing: false,
            batch: MutationBatch::default(),
        }
    }

    pub fn mode(&self) -> ObserveMode {
        self.mode
    }

    pub fn is_observing(&self) -> bool {
        self.observing
    }

    /// Connects to `feed`. Starting an observer that is already running
    /// changes nothing.
    pub fn start<F: MutationFeed + ?Sized>(&mut self, feed: &mut F) {
        if self.observing {
            return;
        }
        log::trace!("observer ({:?}) started", self.mode);
        feed.observe(self.root);
        self.observing = true;
    }

    pub fn register_mutations<D: DomTree + ?Sized>(&mut self, dom: &D, records: Vec<MutationRecord>) {
        for record in records {
            self.register(dom, &record);
        }
    }

    fn register<D: DomTree + ?Sized>(&mut self, dom: &D, record: &MutationRecord) {
        if record.target == self.root {
            self.register_root(dom, record);
            return;
        }
        match self.mode {
            ObserveMode::Leaf => self.register_leaf(dom, record),
            ObserveMode::Block => match find_ancestor_block(dom, record.target) {
                Some((node, key)) => {
                    self.batch.blocks.insert(key, Some(node));
                }
                None => log::debug!("mutation on unaddressed node {:?} ignored", record.target),
            },
        }
    }

    fn register_leaf<D: DomTree + ?Sized>(&mut self, dom: &D, record: &MutationRecord) {
        for &removed in &record.removed_nodes {
            if is_block_root(dom, removed) {
                continue;
            }
            let Some(encoded) = dom.attribute(removed, OFFSET_KEY_ATTR) else {
                continue;
            };
            match OffsetKey::decode(encoded) {
                Ok(key) => {
                    self.batch.leaves.insert(key, None);
                }
                Err(err) => log::warn!("removed leaf {removed:?} has a bad key: {err}"),
            }
        }
        match find_ancestor_offset_key(dom, record.target) {
            Some((leaf, key)) if !is_block_root(dom, leaf) => {
                let text = text_content(dom, leaf);
                log::trace!("leaf {key} -> {text:?}");
                self.batch.leaves.insert(key, Some(text));
            }
            Some((block, _)) => {
                if record.kind == MutationKind::CharacterData || !record.added_nodes.is_empty() {
                    log::debug!("content outside any leaf of block {block:?} ignored");
                }
            }
            None => log::debug!("mutation on unaddressed node {:?} ignored", record.target),
        }
    }

    /// Block roots added or removed right under the editable root have no
    /// finer address than their own key.
    fn register_root<D: DomTree + ?Sized>(&mut self, dom: &D, record: &MutationRecord) {
        for &removed in &record.removed_nodes {
            if let Some(key) = block_key_of(dom, removed) {
                self.batch.blocks.insert(key, None);
            }
        }
        for &added in &record.added_nodes {
            if let Some(key) = block_key_of(dom, added) {
                self.batch.blocks.insert(key, Some(added));
            }
        }
    }

    /// Drains pending records, disconnects, and hands back everything
    /// accumulated. The observer is empty afterwards; flushing again
    /// returns an empty batch.
    pub fn stop_and_flush_mutations<D: DomTree + MutationFeed + ?Sized>(&mut self, dom: &mut D) -> MutationBatch {
        if self.observing {
            let records = dom.take_records();
            self.register_mutations(&*dom, records);
            dom.disconnect();
            self.observing = false;
        }
        let batch = std::mem::take(&mut self.batch);
        log::trace!("observer ({:?}) flushed {} addresses", self.mode, batch.len());
        batch
    }
}
