//! Resolution of "the entities an action applies to" when a call names none.

use crate::metadata_store::{EntityId, MetadataStore};
use anyhow::Result;
use std::sync::{Arc, Mutex};

pub trait SelectionResolver: Send + Sync {
    /// The hovered entity when it lies outside the selection, else the selection.
    fn act_on(&self) -> Result<Vec<EntityId>>;

    fn hovered(&self) -> Option<EntityId>;
}

/// Selection read from the `selected_entities` table, hover kept in memory.
pub struct StoreSelection {
    store: Arc<dyn MetadataStore>,
    hovered: Mutex<Option<EntityId>>,
}

impl StoreSelection {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self {
            store,
            hovered: Mutex::new(None),
        }
    }

    /// Invalid ids clear the hover.
    pub fn set_hovered(&self, entity: Option<EntityId>) {
        *self.hovered.lock().unwrap() = entity.filter(|id| id.is_valid());
    }

    pub fn select(&self, entities: &[EntityId]) -> Result<()> {
        self.store.set_selection(entities)
    }
}

impl SelectionResolver for StoreSelection {
    fn act_on(&self) -> Result<Vec<EntityId>> {
        let selected = self.store.selected_entities()?;
        match self.hovered() {
            Some(hovered) if !selected.contains(&hovered) => Ok(vec![hovered]),
            _ => Ok(selected),
        }
    }

    fn hovered(&self) -> Option<EntityId> {
        *self.hovered.lock().unwrap()
    }
}
