//! Snapshot diffing.
//!
//! Both scans are linear and use the first pair carrying a key, which is fine
//! for the tens of attributes an entity has.

use crate::metadata_store::{EntityId, KeyId, Snapshot, SnapshotDiff, ValueRow};

/// Compute the rows to delete and insert so that the stored state of `entity`
/// goes from `before` to `after`.
///
/// A key is removed when `after` lacks it or carries a different value, which
/// includes the empty sentinel replacing a real value. An empty value is never
/// inserted. Unchanged keys produce nothing, so `diff(s, s)` is always empty.
pub fn diff(entity: EntityId, before: &Snapshot, after: &Snapshot) -> SnapshotDiff {
    let mut removals: Vec<KeyId> = Vec::new();
    for pair in before {
        let remove = after.find(pair.key) != Some(pair.value.as_str());
        if remove && !removals.contains(&pair.key) {
            removals.push(pair.key);
        }
    }

    let insertions = after
        .iter()
        .filter(|pair| !pair.value.is_empty())
        .filter(|pair| before.find(pair.key) != Some(pair.value.as_str()))
        .map(|pair| ValueRow {
            entity,
            key: pair.key,
            value: pair.value.clone(),
        })
        .collect();

    SnapshotDiff {
        removals,
        insertions,
    }
}

/// Strip surrounding whitespace; all-whitespace becomes the empty sentinel.
pub fn cleanup_value(value: &str) -> String {
    value.trim().to_string()
}
