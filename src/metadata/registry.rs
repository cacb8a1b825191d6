//! In-memory registry of attribute definitions.
//!
//! The registry is loaded from the store once and kept sorted by display
//! order. One mutex guards the list; [`AttributeRegistry::lock`] hands out a
//! [`RegistryView`] that keeps it held across several lookups. The mutex is not
//! reentrant: calling any registry method while a view is alive on the same
//! thread deadlocks.

use crate::metadata_store::{tag_subkey, AttributeDefinition, KeyId, MetadataStore, NewAttribute};
use crate::settings::{import_flag_key, SettingsStore, METADATA_FLAG_IMPORTED};
use rusqlite::ErrorCode;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Tag name already registered: {0}")]
    DuplicateTagName(String),

    #[error("Could not read back key of newly registered tag name {0}")]
    KeyLookupFailed(String),

    #[error("Store error: {0}")]
    Store(#[from] anyhow::Error),
}

pub struct AttributeRegistry {
    store: Arc<dyn MetadataStore>,
    settings: Arc<dyn SettingsStore>,
    definitions: Mutex<Vec<AttributeDefinition>>,
}

impl AttributeRegistry {
    /// Empty registry, call [`load`](Self::load) to fill it.
    pub fn new(store: Arc<dyn MetadataStore>, settings: Arc<dyn SettingsStore>) -> Self {
        Self {
            store,
            settings,
            definitions: Mutex::new(Vec::new()),
        }
    }

    /// Replace the in-memory list with the store's definitions.
    pub fn load(&self) -> anyhow::Result<usize> {
        let definitions = self.store.load_definitions()?;
        for definition in &definitions {
            self.seed_import_flag(&definition.tag_name);
        }
        let count = definitions.len();
        *self.definitions.lock().unwrap() = definitions;
        info!("Loaded {} metadata definitions", count);
        Ok(count)
    }

    /// Stable re-sort of the in-memory list by display order.
    pub fn sort(&self) {
        self.definitions
            .lock()
            .unwrap()
            .sort_by_key(|definition| definition.display_order);
    }

    /// Persist a new definition and prepend it to the registry.
    ///
    /// The in-memory list is only touched once the store has accepted the row
    /// and handed back its key.
    pub fn add(&self, attribute: NewAttribute) -> Result<KeyId, RegistryError> {
        if let Err(err) = self.store.insert_definition(&attribute) {
            if is_unique_violation(&err) {
                return Err(RegistryError::DuplicateTagName(attribute.tag_name));
            }
            return Err(err.into());
        }

        let key = self
            .store
            .find_definition_key(&attribute.tag_name)?
            .ok_or_else(|| RegistryError::KeyLookupFailed(attribute.tag_name.clone()))?;

        self.seed_import_flag(&attribute.tag_name);
        debug!("Registered {} as key {}", attribute.tag_name, key);
        self.definitions
            .lock()
            .unwrap()
            .insert(0, attribute.into_definition(key));
        Ok(key)
    }

    /// Persist a new display order for `key` and re-sort.
    /// Returns false when the key is unknown.
    pub fn set_display_order(&self, key: KeyId, display_order: i64) -> anyhow::Result<bool> {
        if !self.store.update_display_order(key, display_order)? {
            return Ok(false);
        }
        let mut definitions = self.definitions.lock().unwrap();
        if let Some(definition) = definitions.iter_mut().find(|d| d.key == key) {
            definition.display_order = display_order;
        }
        definitions.sort_by_key(|definition| definition.display_order);
        Ok(true)
    }

    /// Hold the registry lock until the returned view is dropped.
    pub fn lock(&self) -> RegistryView<'_> {
        RegistryView {
            definitions: self.definitions.lock().unwrap(),
        }
    }

    pub fn by_key_id(&self, key: KeyId) -> Option<AttributeDefinition> {
        self.lock().by_key_id(key).cloned()
    }

    pub fn by_tag_name(&self, tag_name: &str) -> Option<AttributeDefinition> {
        self.lock().by_tag_name(tag_name).cloned()
    }

    pub fn key_id_by_prefix(&self, query: &str) -> Option<KeyId> {
        self.lock().key_id_by_prefix(query)
    }

    pub fn key_for_subkey(&self, subkey: &str) -> Option<KeyId> {
        self.lock().key_for_subkey(subkey)
    }

    pub fn tag_name_for_key(&self, key: KeyId) -> Option<String> {
        self.lock().by_key_id(key).map(|d| d.tag_name.clone())
    }

    /// Owned copy of the registry in its current order.
    pub fn definitions(&self) -> Vec<AttributeDefinition> {
        self.lock().definitions.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make sure the auto-import preference exists, defaulting to imported.
    fn seed_import_flag(&self, tag_name: &str) {
        let setting = import_flag_key(tag_subkey(tag_name));
        let seeded = self.settings.key_exists(&setting).and_then(|exists| {
            if exists {
                Ok(())
            } else {
                self.settings.set_int(&setting, METADATA_FLAG_IMPORTED)
            }
        });
        if let Err(err) = seeded {
            warn!("Failed to seed import flag {}: {:#}", setting, err);
        }
    }
}

fn is_unique_violation(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<rusqlite::Error>(),
        Some(rusqlite::Error::SqliteFailure(failure, _)) if failure.code == ErrorCode::ConstraintViolation
    )
}

/// Lookups performed while the registry lock is held.
pub struct RegistryView<'a> {
    definitions: MutexGuard<'a, Vec<AttributeDefinition>>,
}

impl RegistryView<'_> {
    pub fn by_key_id(&self, key: KeyId) -> Option<&AttributeDefinition> {
        self.definitions.iter().find(|d| d.key == key)
    }

    pub fn by_tag_name(&self, tag_name: &str) -> Option<&AttributeDefinition> {
        self.definitions.iter().find(|d| d.tag_name == tag_name)
    }

    /// First definition, in registry order, whose tag name is a prefix of
    /// `query`. `Xmp.dc.title` matches a query of `Xmp.dc.title[1]`, and also
    /// `Xmp.dc.titles`.
    pub fn key_id_by_prefix(&self, query: &str) -> Option<KeyId> {
        self.definitions
            .iter()
            .find(|d| query.starts_with(d.tag_name.as_str()))
            .map(|d| d.key)
    }

    pub fn key_for_subkey(&self, subkey: &str) -> Option<KeyId> {
        self.definitions
            .iter()
            .find(|d| d.subkey() == subkey)
            .map(|d| d.key)
    }

    /// Keys a bulk clear may remove, in registry order.
    pub fn user_clearable_keys(&self) -> Vec<KeyId> {
        self.definitions
            .iter()
            .filter(|d| d.is_user_clearable())
            .map(|d| d.key)
            .collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AttributeDefinition> {
        self.definitions.iter()
    }
}
