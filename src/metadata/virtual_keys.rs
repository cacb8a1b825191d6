//! Attribute names that alias into other entity properties instead of the
//! generic value table.

use crate::metadata_store::{MetadataStore, Target};
use anyhow::Result;
use serde::Serialize;

pub const RATING_KEY: &str = "Xmp.xmp.Rating";
pub const TAGS_KEY: &str = "Xmp.dc.subject";
pub const COLOR_LABELS_KEY: &str = "Xmp.darktable.colorlabels";

/// Low bits of the entity flags holding the rating.
const RATING_MASK: i64 = 0x7;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VirtualKey {
    Rating,
    Tags,
    ColorLabels,
}

impl VirtualKey {
    /// Matches by prefix, so suffixed names like `Xmp.dc.subject[2]` resolve too.
    pub fn from_key(key: &str) -> Option<Self> {
        if key.starts_with(RATING_KEY) {
            Some(VirtualKey::Rating)
        } else if key.starts_with(TAGS_KEY) {
            Some(VirtualKey::Tags)
        } else if key.starts_with(COLOR_LABELS_KEY) {
            Some(VirtualKey::ColorLabels)
        } else {
            None
        }
    }

    pub fn tag_name(&self) -> &'static str {
        match self {
            VirtualKey::Rating => RATING_KEY,
            VirtualKey::Tags => TAGS_KEY,
            VirtualKey::ColorLabels => COLOR_LABELS_KEY,
        }
    }

    /// Read-only: writes to these properties belong to other subsystems.
    pub fn read(&self, store: &dyn MetadataStore, target: Target) -> Result<MetadataValues> {
        let values = match self {
            VirtualKey::Rating => MetadataValues::Rating(
                store
                    .entity_flags(target)?
                    .into_iter()
                    .map(decode_rating)
                    .collect(),
            ),
            VirtualKey::Tags => MetadataValues::Text(store.tag_names(target)?),
            VirtualKey::ColorLabels => MetadataValues::ColorLabels(store.color_labels(target)?),
        };
        Ok(values)
    }
}

/// Rating encoded in the low three bits, shifted down by one so that 0 reads
/// as -1 (rejected) and the result always lies in `-1..=6`.
pub fn decode_rating(flags: i64) -> i32 {
    ((flags & RATING_MASK) - 1) as i32
}

/// Values returned by a metadata read.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "values", rename_all = "snake_case")]
pub enum MetadataValues {
    Text(Vec<String>),
    Rating(Vec<i32>),
    ColorLabels(Vec<i32>),
}

impl MetadataValues {
    pub fn empty() -> Self {
        MetadataValues::Text(Vec::new())
    }

    pub fn count(&self) -> usize {
        match self {
            MetadataValues::Text(values) => values.len(),
            MetadataValues::Rating(values) | MetadataValues::ColorLabels(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Every value rendered as a string, in order.
    pub fn to_strings(&self) -> Vec<String> {
        match self {
            MetadataValues::Text(values) => values.clone(),
            MetadataValues::Rating(values) | MetadataValues::ColorLabels(values) => {
                values.iter().map(|v| v.to_string()).collect()
            }
        }
    }
}
