//! The metadata mutation engine.

mod diff;
mod history;
mod mutation;
mod registry;
mod selection;
mod signals;
mod undo;
mod virtual_keys;

pub use diff::{cleanup_value, diff};
pub use history::{UndoHistory, UndoStep, DEFAULT_UNDO_DEPTH};
pub use mutation::{
    BatchReport, EngineOptions, EntityOutcome, MetadataEngine, Mutation, SidecarMode,
};
pub use registry::{AttributeRegistry, RegistryError, RegistryView};
pub use selection::{SelectionResolver, StoreSelection};
pub use signals::{MetadataSignal, SignalBus};
pub use undo::{Direction, UndoEntry, UndoGroup, UndoKind};
pub use virtual_keys::{
    decode_rating, MetadataValues, VirtualKey, COLOR_LABELS_KEY, RATING_KEY, TAGS_KEY,
};
