use crate::model::block::BlockKey;
use crate::offset_key::{OffsetKey, OffsetKeyError};

/// Contract violations surfaced by the reconciliation entry points.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    OffsetKey(#[from] OffsetKeyError),
    #[error("Unknown block: {0}")]
    UnknownBlock(BlockKey),
    #[error("Leaf {0} is not in the block tree")]
    MissingLeaf(OffsetKey),
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
