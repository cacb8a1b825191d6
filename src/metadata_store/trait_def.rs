//! MetadataStore trait definition.
//!
//! The narrow storage interface the metadata engine works through. It covers
//! the two logical relations of the engine (definitions and values) plus the
//! entity-side data that virtual keys and selection resolution read.

use super::models::{AttributeDefinition, EntityId, KeyId, NewAttribute, Snapshot, SnapshotDiff, Target};
use anyhow::Result;

pub trait MetadataStore: Send + Sync {
    // =========================================================================
    // Attribute definitions
    // =========================================================================

    /// All definitions ordered by display order.
    fn load_definitions(&self) -> Result<Vec<AttributeDefinition>>;

    /// Insert a new definition. Fails on a duplicate tag name.
    fn insert_definition(&self, attribute: &NewAttribute) -> Result<()>;

    /// Key id of the definition with exactly this tag name.
    fn find_definition_key(&self, tag_name: &str) -> Result<Option<KeyId>>;

    /// Returns false when no definition has this key.
    fn update_display_order(&self, key: KeyId, display_order: i64) -> Result<bool>;

    // =========================================================================
    // Attribute values
    // =========================================================================

    /// Every stored (key, value) pair of an entity, in storage order.
    fn read_snapshot(&self, entity: EntityId) -> Result<Snapshot>;

    /// Delete the removed keys then insert the new rows, as one unit of work.
    fn apply_delta(&self, entity: EntityId, delta: &SnapshotDiff) -> Result<()>;

    /// Values of one key for an entity, or for every selected entity ordered by value.
    fn values_for_key(&self, target: Target, key: KeyId) -> Result<Vec<String>>;

    /// Number of stored values equal to `value`, across all keys.
    fn count_values_equal(&self, value: &str) -> Result<usize>;

    // =========================================================================
    // Virtual key backing data
    // =========================================================================

    /// Raw packed flags of the targeted entities.
    fn entity_flags(&self, target: Target) -> Result<Vec<i64>>;

    fn tag_names(&self, target: Target) -> Result<Vec<String>>;

    /// Color labels; ordered by color for a single entity.
    fn color_labels(&self, target: Target) -> Result<Vec<i32>>;

    // =========================================================================
    // Entities and selection
    // =========================================================================

    fn insert_entity(&self, filename: &str) -> Result<EntityId>;

    fn entity_exists(&self, entity: EntityId) -> Result<bool>;

    fn set_entity_flags(&self, entity: EntityId, flags: i64) -> Result<()>;

    fn attach_tag(&self, entity: EntityId, tag_name: &str) -> Result<()>;

    fn add_color_label(&self, entity: EntityId, color: i32) -> Result<()>;

    fn selected_entities(&self) -> Result<Vec<EntityId>>;

    /// Replace the current selection.
    fn set_selection(&self, entities: &[EntityId]) -> Result<()>;
}
