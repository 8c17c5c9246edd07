use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::model::character::EntityKey;

/// How an entity reacts to edits of the text it annotates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mutability {
    /// Text may change freely and the entity stays attached.
    Mutable,
    /// Any edit to the text removes the entity.
    Immutable,
    /// Edits remove the affected segment together with the entity.
    Segmented,
}

/// Annotation shared by a run of characters (links, mentions, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    pub kind: String,
    pub mutability: Mutability,
    pub data: BTreeMap<String, String>,
}

impl Entity {
    pub fn new(kind: impl Into<String>, mutability: Mutability) -> Self {
        Self {
            kind: kind.into(),
            mutability,
            data: BTreeMap::new(),
        }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn is_mutable(&self) -> bool {
        self.mutability == Mutability::Mutable
    }
}

/// Entity table of a document. Cloning is cheap; writes copy the table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityMap {
    entries: Arc<BTreeMap<EntityKey, Arc<Entity>>>,
    last_key: u64,
}

impl EntityMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &EntityKey) -> Option<&Entity> {
        self.entries.get(key).map(Arc::as_ref)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EntityKey, &Entity)> {
        self.entries.iter().map(|(key, entity)| (key, entity.as_ref()))
    }

    /// Adds `entity` under the next numeric key.
    pub fn create(&self, entity: Entity) -> (Self, EntityKey) {
        let mut next = self.clone();
        loop {
            next.last_key += 1;
            let key = EntityKey::new(next.last_key.to_string());
            if !next.entries.contains_key(&key) {
                Arc::make_mut(&mut next.entries).insert(key.clone(), Arc::new(entity));
                return (next, key);
            }
        }
    }

    /// Adds or replaces the entity stored under `key`.
    pub fn insert(&self, key: EntityKey, entity: Entity) -> Self {
        let mut next = self.clone();
        Arc::make_mut(&mut next.entries).insert(key, Arc::new(entity));
        next
    }
}
