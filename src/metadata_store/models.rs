//! Models for the SQLite-backed metadata store.
//!
//! Ids are thin newtypes over the SQLite integer rowids so that entity ids and
//! attribute key ids cannot be mixed up at call sites.

use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Identifiers
// =============================================================================

/// Identifier of a catalog entity (an imported media item).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub i64);

impl EntityId {
    /// Rowids start at 1, anything else is the "no entity" placeholder.
    pub fn is_valid(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a registered attribute definition, assigned by the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyId(pub i64);

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Attribute definitions
// =============================================================================

/// A registered attribute key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDefinition {
    pub key: KeyId,
    /// Dotted hierarchical name, unique across the registry (e.g. `Xmp.dc.creator`).
    pub tag_name: String,
    pub name: String,
    /// System managed, never cleared in bulk.
    pub internal: bool,
    pub visible: bool,
    /// Excluded from export.
    pub private: bool,
    pub display_order: i64,
}

impl AttributeDefinition {
    /// Substring after the last `.` of the tag name, or the whole tag name.
    pub fn subkey(&self) -> &str {
        tag_subkey(&self.tag_name)
    }

    /// Keys a user may clear in bulk.
    pub fn is_user_clearable(&self) -> bool {
        !self.internal && self.visible
    }
}

pub fn tag_subkey(tag_name: &str) -> &str {
    match tag_name.rfind('.') {
        Some(pos) => &tag_name[pos + 1..],
        None => tag_name,
    }
}

/// Input for registering a new attribute definition; the key id comes from the store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAttribute {
    pub tag_name: String,
    pub name: String,
    #[serde(default)]
    pub internal: bool,
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub display_order: i64,
}

fn default_visible() -> bool {
    true
}

impl NewAttribute {
    pub fn new(tag_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            tag_name: tag_name.into(),
            name: name.into(),
            internal: false,
            visible: true,
            private: false,
            display_order: 0,
        }
    }

    pub fn internal(mut self) -> Self {
        self.internal = true;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn private(mut self) -> Self {
        self.private = true;
        self
    }

    pub fn with_display_order(mut self, display_order: i64) -> Self {
        self.display_order = display_order;
        self
    }

    pub fn into_definition(self, key: KeyId) -> AttributeDefinition {
        AttributeDefinition {
            key,
            tag_name: self.tag_name,
            name: self.name,
            internal: self.internal,
            visible: self.visible,
            private: self.private,
            display_order: self.display_order,
        }
    }
}

// =============================================================================
// Snapshots
// =============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataPair {
    pub key: KeyId,
    pub value: String,
}

impl MetadataPair {
    pub fn new(key: KeyId, value: impl Into<String>) -> Self {
        Self {
            key,
            value: value.into(),
        }
    }
}

/// Ordered key/value state of one entity, current or proposed.
///
/// Lookups use the first pair carrying a key; later duplicates are ignored.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    pairs: Vec<MetadataPair>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs(pairs: Vec<MetadataPair>) -> Self {
        Self { pairs }
    }

    pub fn push(&mut self, key: KeyId, value: impl Into<String>) {
        self.pairs.push(MetadataPair::new(key, value));
    }

    pub fn with(mut self, key: KeyId, value: impl Into<String>) -> Self {
        self.push(key, value);
        self
    }

    pub fn find(&self, key: KeyId) -> Option<&str> {
        self.pairs
            .iter()
            .find(|pair| pair.key == key)
            .map(|pair| pair.value.as_str())
    }

    pub fn contains(&self, key: KeyId) -> bool {
        self.find(key).is_some()
    }

    /// Overwrite the value of keys already present, append the others.
    pub fn merge(&mut self, payload: &Snapshot) {
        for pair in &payload.pairs {
            match self.pairs.iter_mut().find(|p| p.key == pair.key) {
                Some(existing) => existing.value = pair.value.clone(),
                None => self.pairs.push(pair.clone()),
            }
        }
    }

    /// Drop every pair whose key is listed.
    pub fn remove_keys(&mut self, keys: &[KeyId]) {
        self.pairs.retain(|pair| !keys.contains(&pair.key));
    }

    pub fn keys(&self) -> impl Iterator<Item = KeyId> + '_ {
        self.pairs.iter().map(|pair| pair.key)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MetadataPair> {
        self.pairs.iter()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl<'a> IntoIterator for &'a Snapshot {
    type Item = &'a MetadataPair;
    type IntoIter = std::slice::Iter<'a, MetadataPair>;

    fn into_iter(self) -> Self::IntoIter {
        self.pairs.iter()
    }
}

impl FromIterator<MetadataPair> for Snapshot {
    fn from_iter<T: IntoIterator<Item = MetadataPair>>(iter: T) -> Self {
        Self {
            pairs: iter.into_iter().collect(),
        }
    }
}

/// One attribute value row to be persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueRow {
    pub entity: EntityId,
    pub key: KeyId,
    pub value: String,
}

/// Persisted delta turning one snapshot into another.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SnapshotDiff {
    /// Keys whose rows are deleted, without duplicates.
    pub removals: Vec<KeyId>,
    pub insertions: Vec<ValueRow>,
}

impl SnapshotDiff {
    pub fn is_empty(&self) -> bool {
        self.removals.is_empty() && self.insertions.is_empty()
    }
}

// =============================================================================
// Targets
// =============================================================================

/// What a read is aimed at: one entity, or the current selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Target {
    Entity(EntityId),
    Selection,
}

impl Target {
    /// Invalid ids act as the selection placeholder.
    pub fn from_entity(entity: Option<EntityId>) -> Self {
        match entity {
            Some(id) if id.is_valid() => Target::Entity(id),
            _ => Target::Selection,
        }
    }
}
