//! Catalog fixtures backed by a temporary SQLite file.

use super::constants::*;
use catalog_metadata::metadata::{EngineOptions, MetadataEngine, StoreSelection};
use catalog_metadata::metadata_store::{
    EntityId, KeyId, MetadataStore, NewAttribute, SqliteMetadataStore,
};
use catalog_metadata::settings::SqliteSettingsStore;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

pub struct TestCatalog {
    pub engine: MetadataEngine,
    pub store: Arc<SqliteMetadataStore>,
    pub settings: Arc<SqliteSettingsStore>,
    pub selection: Arc<StoreSelection>,
    pub db_path: PathBuf,
    options: EngineOptions,
    // Dropped last, removes the database file
    _temp_dir: Arc<TempDir>,
}

impl TestCatalog {
    /// Fresh catalog with the standard keys registered.
    pub fn spawn() -> Self {
        Self::spawn_with(EngineOptions::default())
    }

    pub fn spawn_with(options: EngineOptions) -> Self {
        let temp_dir = Arc::new(TempDir::new().expect("Failed to create temp dir"));
        let db_path = temp_dir.path().join("metadata.db");
        let catalog = Self::open(db_path, options, temp_dir);
        catalog.register_standard_keys();
        catalog
    }

    /// A second engine over the same database file, with empty undo history.
    pub fn reopen(&self) -> Self {
        Self::open(self.db_path.clone(), self.options, self._temp_dir.clone())
    }

    fn open(db_path: PathBuf, options: EngineOptions, temp_dir: Arc<TempDir>) -> Self {
        let store =
            Arc::new(SqliteMetadataStore::new(&db_path).expect("Failed to open metadata store"));
        let settings = Arc::new(SqliteSettingsStore::new(store.connection()));
        let selection = Arc::new(StoreSelection::new(store.clone()));
        let engine = MetadataEngine::new(store.clone(), settings.clone(), selection.clone(), options)
            .expect("Failed to create engine");
        TestCatalog {
            engine,
            store,
            settings,
            selection,
            db_path,
            options,
            _temp_dir: temp_dir,
        }
    }

    fn register_standard_keys(&self) {
        let attributes = [
            NewAttribute::new(CREATOR_TAG, "creator").with_display_order(0),
            NewAttribute::new(PUBLISHER_TAG, "publisher").with_display_order(1),
            NewAttribute::new(TITLE_TAG, "title").with_display_order(2),
            NewAttribute::new(DESCRIPTION_TAG, "description").with_display_order(3),
            NewAttribute::new(NOTES_TAG, "notes")
                .hidden()
                .with_display_order(4),
            NewAttribute::new(IMPORT_ID_TAG, "import id")
                .internal()
                .with_display_order(5),
        ];
        for attribute in attributes {
            self.engine
                .registry()
                .add(attribute)
                .expect("Failed to register key");
        }
        self.engine.registry().sort();
    }

    pub fn key(&self, tag_name: &str) -> KeyId {
        self.engine
            .registry()
            .by_tag_name(tag_name)
            .map(|definition| definition.key)
            .expect("Unknown tag name")
    }

    pub fn add_entity(&self, filename: &str) -> EntityId {
        self.store
            .insert_entity(filename)
            .expect("Failed to insert entity")
    }

    pub fn value(&self, entity: EntityId, tag_name: &str) -> Option<String> {
        self.engine
            .snapshot(entity)
            .expect("Failed to read snapshot")
            .find(self.key(tag_name))
            .map(str::to_string)
    }
}
