pub mod block;
pub mod block_tree;
pub mod character;
pub mod commands;
pub mod content;
pub mod dump;
pub mod editor_state;
pub mod entity;
pub mod modifier;
pub mod selection_state;

pub use block::{BlockKey, ContentBlock, UNSTYLED};
pub use block_tree::{BlockTree, DecoratorRange, Decorator, LeafRange};
pub use character::{CharacterMetadata, EntityKey, StyleSet};
pub use commands::Cmd;
pub use content::ContentState;
pub use dump::DocumentDump;
pub use editor_state::{ChangeType, EditorState};
pub use entity::{Entity, EntityMap, Mutability};
pub use selection_state::SelectionState;
