//! Catalog metadata library
//!
//! Attribute registry, snapshot diffing, batch mutations with undo/redo, and
//! the SQLite storage underneath them.

pub mod config;
pub mod metadata;
pub mod metadata_store;
pub mod settings;
pub mod sqlite_persistence;

// Re-export commonly used types for convenience
pub use metadata::{MetadataEngine, Mutation, SidecarMode, StoreSelection};
pub use metadata_store::{EntityId, KeyId, MetadataStore, Snapshot, SqliteMetadataStore};
pub use settings::{SettingsStore, SqliteSettingsStore};
