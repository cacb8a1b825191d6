use super::models::{
    AttributeDefinition, EntityId, KeyId, MetadataPair, NewAttribute, Snapshot, SnapshotDiff,
    Target,
};
use super::schema::METADATA_VERSIONED_SCHEMAS;
use super::MetadataStore;
use crate::sqlite_persistence::ensure_schema;
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// SQLite implementation of [`MetadataStore`].
///
/// The connection is shared so that the settings store can live in the same
/// database file.
#[derive(Clone)]
pub struct SqliteMetadataStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteMetadataStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref();
        info!("Opening metadata database at {:?}", path);
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open metadata database at {:?}", path))?;
        Self::from_connection(Arc::new(Mutex::new(conn)))
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::from_connection(Arc::new(Mutex::new(conn)))
    }

    /// Wrap an existing connection, creating or validating the schema.
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self> {
        {
            let locked = conn.lock().unwrap();
            ensure_schema(&locked, METADATA_VERSIONED_SCHEMAS, "metadata")?;
        }
        Ok(Self { conn })
    }

    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        self.conn.clone()
    }

    fn row_to_definition(row: &rusqlite::Row) -> rusqlite::Result<AttributeDefinition> {
        Ok(AttributeDefinition {
            key: KeyId(row.get("key")?),
            tag_name: row.get("tagname")?,
            name: row.get("name")?,
            internal: row.get::<_, i64>("internal")? != 0,
            visible: row.get::<_, i64>("visible")? != 0,
            private: row.get::<_, i64>("private")? != 0,
            display_order: row.get("display_order")?,
        })
    }
}

impl MetadataStore for SqliteMetadataStore {
    fn load_definitions(&self) -> Result<Vec<AttributeDefinition>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT key, tagname, name, internal, visible, private, display_order
             FROM metadata_keys
             ORDER BY display_order",
        )?;
        let definitions = stmt
            .query_map([], Self::row_to_definition)?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read metadata definitions")?;
        Ok(definitions)
    }

    fn insert_definition(&self, attribute: &NewAttribute) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO metadata_keys (tagname, name, internal, visible, private, display_order)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                attribute.tag_name,
                attribute.name,
                attribute.internal as i64,
                attribute.visible as i64,
                attribute.private as i64,
                attribute.display_order,
            ],
        )
        .with_context(|| format!("Failed to insert definition {}", attribute.tag_name))?;
        Ok(())
    }

    fn find_definition_key(&self, tag_name: &str) -> Result<Option<KeyId>> {
        let conn = self.conn.lock().unwrap();
        let key = conn
            .query_row(
                "SELECT key FROM metadata_keys WHERE tagname = ?1",
                params![tag_name],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(key.map(KeyId))
    }

    fn update_display_order(&self, key: KeyId, display_order: i64) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE metadata_keys SET display_order = ?1 WHERE key = ?2",
            params![display_order, key.0],
        )?;
        Ok(updated > 0)
    }

    fn read_snapshot(&self, entity: EntityId) -> Result<Snapshot> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT key, value FROM metadata_values WHERE entity_id = ?1 ORDER BY rowid",
        )?;
        let snapshot = stmt
            .query_map(params![entity.0], |row| {
                Ok(MetadataPair {
                    key: KeyId(row.get(0)?),
                    value: row.get(1)?,
                })
            })?
            .collect::<Result<Snapshot, _>>()
            .with_context(|| format!("Failed to read metadata of entity {}", entity))?;
        Ok(snapshot)
    }

    fn apply_delta(&self, entity: EntityId, delta: &SnapshotDiff) -> Result<()> {
        if delta.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        {
            let mut delete =
                tx.prepare("DELETE FROM metadata_values WHERE entity_id = ?1 AND key = ?2")?;
            for key in &delta.removals {
                delete.execute(params![entity.0, key.0])?;
            }
            let mut insert = tx.prepare(
                "INSERT INTO metadata_values (entity_id, key, value) VALUES (?1, ?2, ?3)",
            )?;
            for row in &delta.insertions {
                insert.execute(params![row.entity.0, row.key.0, row.value])?;
            }
        }
        tx.commit()
            .with_context(|| format!("Failed to commit metadata of entity {}", entity))?;
        debug!(
            "Entity {}: removed {} keys, inserted {} values",
            entity,
            delta.removals.len(),
            delta.insertions.len()
        );
        Ok(())
    }

    fn values_for_key(&self, target: Target, key: KeyId) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let values = match target {
            Target::Entity(entity) => {
                let mut stmt = conn.prepare(
                    "SELECT value FROM metadata_values WHERE entity_id = ?1 AND key = ?2 ORDER BY rowid",
                )?;
                let rows = stmt.query_map(params![entity.0, key.0], |row| row.get(0))?;
                rows.collect::<Result<Vec<String>, _>>()?
            }
            Target::Selection => {
                let mut stmt = conn.prepare(
                    "SELECT value FROM metadata_values
                     WHERE entity_id IN (SELECT entity_id FROM selected_entities) AND key = ?1
                     ORDER BY value",
                )?;
                let rows = stmt.query_map(params![key.0], |row| row.get(0))?;
                rows.collect::<Result<Vec<String>, _>>()?
            }
        };
        Ok(values)
    }

    fn count_values_equal(&self, value: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM metadata_values WHERE value = ?1",
            params![value],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn entity_flags(&self, target: Target) -> Result<Vec<i64>> {
        let conn = self.conn.lock().unwrap();
        let flags = match target {
            Target::Entity(entity) => {
                let mut stmt = conn.prepare("SELECT flags FROM entities WHERE id = ?1")?;
                let rows = stmt.query_map(params![entity.0], |row| row.get(0))?;
                rows.collect::<Result<Vec<i64>, _>>()?
            }
            Target::Selection => {
                let mut stmt = conn.prepare(
                    "SELECT flags FROM entities
                     WHERE id IN (SELECT entity_id FROM selected_entities)
                     ORDER BY id",
                )?;
                let rows = stmt.query_map([], |row| row.get(0))?;
                rows.collect::<Result<Vec<i64>, _>>()?
            }
        };
        Ok(flags)
    }

    fn tag_names(&self, target: Target) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let names = match target {
            Target::Entity(entity) => {
                let mut stmt = conn.prepare(
                    "SELECT t.name FROM tags t
                     JOIN tagged_entities te ON te.tag_id = t.id
                     WHERE te.entity_id = ?1
                     ORDER BY te.rowid",
                )?;
                let rows = stmt.query_map(params![entity.0], |row| row.get(0))?;
                rows.collect::<Result<Vec<String>, _>>()?
            }
            Target::Selection => {
                let mut stmt = conn.prepare(
                    "SELECT t.name FROM tags t
                     JOIN tagged_entities te ON te.tag_id = t.id
                     WHERE te.entity_id IN (SELECT entity_id FROM selected_entities)
                     ORDER BY te.rowid",
                )?;
                let rows = stmt.query_map([], |row| row.get(0))?;
                rows.collect::<Result<Vec<String>, _>>()?
            }
        };
        Ok(names)
    }

    fn color_labels(&self, target: Target) -> Result<Vec<i32>> {
        let conn = self.conn.lock().unwrap();
        let colors = match target {
            Target::Entity(entity) => {
                let mut stmt = conn.prepare(
                    "SELECT color FROM color_labels WHERE entity_id = ?1 ORDER BY color",
                )?;
                let rows = stmt.query_map(params![entity.0], |row| row.get(0))?;
                rows.collect::<Result<Vec<i32>, _>>()?
            }
            Target::Selection => {
                let mut stmt = conn.prepare(
                    "SELECT color FROM color_labels
                     WHERE entity_id IN (SELECT entity_id FROM selected_entities)
                     ORDER BY rowid",
                )?;
                let rows = stmt.query_map([], |row| row.get(0))?;
                rows.collect::<Result<Vec<i32>, _>>()?
            }
        };
        Ok(colors)
    }

    fn insert_entity(&self, filename: &str) -> Result<EntityId> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO entities (filename) VALUES (?1)",
            params![filename],
        )
        .with_context(|| format!("Failed to insert entity {}", filename))?;
        Ok(EntityId(conn.last_insert_rowid()))
    }

    fn entity_exists(&self, entity: EntityId) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let found = conn
            .query_row(
                "SELECT 1 FROM entities WHERE id = ?1",
                params![entity.0],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn set_entity_flags(&self, entity: EntityId, flags: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE entities SET flags = ?1 WHERE id = ?2",
            params![flags, entity.0],
        )?;
        if updated == 0 {
            anyhow::bail!("Entity {} not found", entity);
        }
        Ok(())
    }

    fn attach_tag(&self, entity: EntityId, tag_name: &str) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT OR IGNORE INTO tags (name) VALUES (?1)",
            params![tag_name],
        )?;
        let tag_id: i64 = tx.query_row(
            "SELECT id FROM tags WHERE name = ?1",
            params![tag_name],
            |row| row.get(0),
        )?;
        tx.execute(
            "INSERT OR IGNORE INTO tagged_entities (entity_id, tag_id) VALUES (?1, ?2)",
            params![entity.0, tag_id],
        )
        .with_context(|| format!("Failed to tag entity {} with {}", entity, tag_name))?;
        tx.commit()?;
        Ok(())
    }

    fn add_color_label(&self, entity: EntityId, color: i32) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO color_labels (entity_id, color) VALUES (?1, ?2)",
            params![entity.0, color],
        )
        .with_context(|| format!("Failed to add color label to entity {}", entity))?;
        Ok(())
    }

    fn selected_entities(&self) -> Result<Vec<EntityId>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT entity_id FROM selected_entities ORDER BY entity_id")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, i64>(0))?
            .map(|r| r.map(EntityId))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn set_selection(&self, entities: &[EntityId]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM selected_entities", [])?;
        {
            let mut insert =
                tx.prepare("INSERT OR IGNORE INTO selected_entities (entity_id) VALUES (?1)")?;
            for entity in entities {
                insert.execute(params![entity.0])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}
