//! Undo records of metadata mutations and their replay.
//!
//! A group stores, per touched entity, the snapshot before and after the
//! mutation. Undo and redo run the same replay with the two snapshots swapped.

use super::diff::diff;
use crate::metadata_store::{EntityId, MetadataStore, Snapshot};
use std::fmt;
use tracing::{debug, error};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UndoKind {
    Metadata,
}

impl fmt::Display for UndoKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UndoKind::Metadata => write!(f, "metadata"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Undo,
    Redo,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UndoEntry {
    pub entity: EntityId,
    pub before: Snapshot,
    pub after: Snapshot,
}

impl UndoEntry {
    /// Snapshots in replay order: (current state, target state).
    fn endpoints(&self, direction: Direction) -> (&Snapshot, &Snapshot) {
        match direction {
            Direction::Undo => (&self.after, &self.before),
            Direction::Redo => (&self.before, &self.after),
        }
    }
}

/// Before/after pairs of every entity touched by one user action.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UndoGroup {
    pub kind: UndoKind,
    pub entries: Vec<UndoEntry>,
}

impl UndoGroup {
    pub fn new(kind: UndoKind) -> Self {
        Self {
            kind,
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, entity: EntityId, before: Snapshot, after: Snapshot) {
        self.entries.push(UndoEntry {
            entity,
            before,
            after,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entities(&self) -> Vec<EntityId> {
        self.entries.iter().map(|entry| entry.entity).collect()
    }

    /// Write the reverse (undo) or forward (redo) delta of every entry.
    ///
    /// A failed write is logged and the remaining entries are still replayed.
    /// Returns the touched entities, in entry order.
    pub fn replay(&self, store: &dyn MetadataStore, direction: Direction) -> Vec<EntityId> {
        let mut touched = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let (from, to) = entry.endpoints(direction);
            let delta = diff(entry.entity, from, to);
            if let Err(err) = store.apply_delta(entry.entity, &delta) {
                error!(
                    "Failed to replay {:?} of {} on entity {}: {:#}",
                    direction, self.kind, entry.entity, err
                );
            }
            if !touched.contains(&entry.entity) {
                touched.push(entry.entity);
            }
        }
        debug!(
            "Replayed {:?} of {} on {} entities",
            direction,
            self.kind,
            touched.len()
        );
        touched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata_store::{KeyId, NewAttribute, SqliteMetadataStore};

    fn setup() -> (SqliteMetadataStore, EntityId, KeyId) {
        let store = SqliteMetadataStore::in_memory().unwrap();
        let entity = store.insert_entity("a.raw").unwrap();
        store
            .insert_definition(&NewAttribute::new("Xmp.dc.creator", "creator"))
            .unwrap();
        let key = store.find_definition_key("Xmp.dc.creator").unwrap().unwrap();
        (store, entity, key)
    }

    #[test]
    fn test_undo_then_redo_is_symmetric() {
        let (store, entity, creator) = setup();
        let before = Snapshot::new().with(creator, "Ann");
        let after = Snapshot::new().with(creator, "Bea");
        store
            .apply_delta(entity, &diff(entity, &Snapshot::new(), &after))
            .unwrap();

        let mut group = UndoGroup::new(UndoKind::Metadata);
        group.push(entity, before.clone(), after.clone());

        assert_eq!(group.replay(&store, Direction::Undo), vec![entity]);
        assert_eq!(store.read_snapshot(entity).unwrap(), before);

        assert_eq!(group.replay(&store, Direction::Redo), vec![entity]);
        assert_eq!(store.read_snapshot(entity).unwrap(), after);
    }

    #[test]
    fn test_replay_continues_after_failure() {
        let (store, entity, creator) = setup();
        let missing = EntityId(99);

        let mut group = UndoGroup::new(UndoKind::Metadata);
        group.push(missing, Snapshot::new(), Snapshot::new().with(creator, "x"));
        group.push(entity, Snapshot::new(), Snapshot::new().with(creator, "Ann"));

        let touched = group.replay(&store, Direction::Redo);

        assert_eq!(touched, vec![missing, entity]);
        assert_eq!(store.read_snapshot(entity).unwrap().find(creator), Some("Ann"));
    }

    #[test]
    fn test_touched_entities_deduplicated() {
        let (store, entity, creator) = setup();
        let mut group = UndoGroup::new(UndoKind::Metadata);
        group.push(entity, Snapshot::new(), Snapshot::new().with(creator, "Ann"));
        group.push(entity, Snapshot::new().with(creator, "Ann"), Snapshot::new());

        assert_eq!(group.replay(&store, Direction::Undo), vec![entity]);
        assert_eq!(group.entities(), vec![entity, entity]);
    }
}
