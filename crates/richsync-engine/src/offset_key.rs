//! Addresses of rendered leaves.
//!
//! Every rendered leaf carries `data-offset-key="{block}-{decorator}-{leaf}"`.
//! The two numeric parts are split off from the right, so block keys are
//! free to contain `-`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::model::block::BlockKey;

const DELIMITER: char = '-';

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OffsetKeyError {
    #[error("Offset key {0:?} does not have three parts")]
    Malformed(String),
    #[error("Offset key {key:?} has a non-numeric {part} index")]
    BadIndex { key: String, part: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OffsetKey {
    pub block_key: BlockKey,
    pub decorator_key: usize,
    pub leaf_key: usize,
}

impl OffsetKey {
    pub fn new(block_key: BlockKey, decorator_key: usize, leaf_key: usize) -> Self {
        Self {
            block_key,
            decorator_key,
            leaf_key,
        }
    }

    /// Key stamped on a block root: its first leaf.
    pub fn for_block(block_key: BlockKey) -> Self {
        Self::new(block_key, 0, 0)
    }

    pub fn encode(&self) -> String {
        self.to_string()
    }

    pub fn decode(encoded: &str) -> Result<Self, OffsetKeyError> {
        let mut parts = encoded.rsplitn(3, DELIMITER);
        let (Some(leaf), Some(decorator), Some(block)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(OffsetKeyError::Malformed(encoded.to_string()));
        };
        if block.is_empty() {
            return Err(OffsetKeyError::Malformed(encoded.to_string()));
        }
        let index = |value: &str, part| {
            value.parse::<usize>().map_err(|_| OffsetKeyError::BadIndex {
                key: encoded.to_string(),
                part,
            })
        };
        Ok(Self {
            block_key: BlockKey::from(block),
            decorator_key: index(decorator, "decorator")?,
            leaf_key: index(leaf, "leaf")?,
        })
    }
}

impl fmt::Display for OffsetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{DELIMITER}{}{DELIMITER}{}",
            self.block_key, self.decorator_key, self.leaf_key
        )
    }
}

impl FromStr for OffsetKey {
    type Err = OffsetKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

impl Serialize for OffsetKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for OffsetKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Self::decode(&encoded).map_err(serde::de::Error::custom)
    }
}
