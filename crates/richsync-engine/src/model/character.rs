//! Per-character style and entity metadata.
//!
//! Every [`CharacterMetadata`] value is interned: building the same
//! `(style, entity)` pair twice hands back the same `Arc`, so a block's
//! character list can be compared position by position with
//! [`Arc::ptr_eq`] and untouched positions are shared between document
//! versions instead of copied.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use serde::{Deserialize, Serialize};

/// Ordered, duplicate-free set of inline style tags (`BOLD`, `ITALIC`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StyleSet(BTreeSet<String>);

impl StyleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, style: &str) -> bool {
        self.0.contains(style)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Copy of this set with `style` added.
    pub fn with(&self, style: &str) -> Self {
        let mut styles = self.0.clone();
        styles.insert(style.to_string());
        Self(styles)
    }

    /// Copy of this set with `style` removed.
    pub fn without(&self, style: &str) -> Self {
        let mut styles = self.0.clone();
        styles.remove(style);
        Self(styles)
    }
}

impl<S: Into<String>> FromIterator<S> for StyleSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for StyleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<&str> = self.iter().collect();
        write!(f, "{}", joined.join(" "))
    }
}

/// Key into a document's entity map.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityKey(String);

impl EntityKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EntityKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable metadata attached to a single character of a block.
///
/// Construct through [`CharacterMetadata::create`] or
/// [`CharacterMetadata::empty`]; both go through the intern pool.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct CharacterMetadata {
    style: StyleSet,
    entity: Option<EntityKey>,
}

type Pool = Mutex<HashMap<(StyleSet, Option<EntityKey>), Arc<CharacterMetadata>>>;

fn pool() -> &'static Pool {
    static POOL: OnceLock<Pool> = OnceLock::new();
    POOL.get_or_init(|| Mutex::new(HashMap::new()))
}

impl CharacterMetadata {
    /// Returns the shared instance for `(style, entity)`.
    pub fn create(style: StyleSet, entity: Option<EntityKey>) -> Arc<Self> {
        let mut pool = pool().lock().unwrap_or_else(PoisonError::into_inner);
        pool.entry((style.clone(), entity.clone()))
            .or_insert_with(|| Arc::new(Self { style, entity }))
            .clone()
    }

    /// No styles, no entity.
    pub fn empty() -> Arc<Self> {
        Self::create(StyleSet::new(), None)
    }

    pub fn style(&self) -> &StyleSet {
        &self.style
    }

    pub fn entity(&self) -> Option<&EntityKey> {
        self.entity.as_ref()
    }

    pub fn has_style(&self, style: &str) -> bool {
        self.style.contains(style)
    }

    pub fn apply_style(&self, style: &str) -> Arc<Self> {
        Self::create(self.style.with(style), self.entity.clone())
    }

    pub fn remove_style(&self, style: &str) -> Arc<Self> {
        Self::create(self.style.without(style), self.entity.clone())
    }

    pub fn apply_entity(&self, entity: Option<EntityKey>) -> Arc<Self> {
        Self::create(self.style.clone(), entity)
    }
}
