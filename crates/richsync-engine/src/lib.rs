pub mod composition;
pub mod dom;
pub mod error;
pub mod input;
pub mod model;
pub mod observer;
pub mod offset_key;
pub mod selection;
pub mod surface;

// Re-export key types for easier usage
pub use composition::{CompositionPhase, CompositionSession, ResolveTask, SessionId};
pub use dom::{BlockRenderer, DomPoint, DomSelection, DomTree, MemoryDom, MutationFeed, NodeId, Renderer};
pub use error::{EngineError, Result};
pub use input::{EngineQuirks, InputOutcome, InputType};
pub use model::*;
pub use observer::{DomObserver, MutationBatch, ObserveMode};
pub use offset_key::{OffsetKey, OffsetKeyError};
pub use selection::{DomSelectionResult, reconstruct_selection};
pub use surface::{EditorSurface, Effect, Event, Key, Mode, SurfaceOptions};
