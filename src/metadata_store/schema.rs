//! SQLite schema definitions for the metadata database.
//!
//! Besides the attribute definitions and values, the database carries the
//! entity-side tables that virtual keys alias into (flags, tags, color labels),
//! the current selection and a small key/value settings table.

use crate::sqlite_column;
use crate::sqlite_persistence::{
    Column, ForeignKey, ForeignKeyOnChange, SqlType, Table, VersionedSchema,
};

const ENTITY_FK: ForeignKey = ForeignKey {
    foreign_table: "entities",
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::Cascade,
};

const METADATA_KEY_FK: ForeignKey = ForeignKey {
    foreign_table: "metadata_keys",
    foreign_column: "key",
    on_delete: ForeignKeyOnChange::Cascade,
};

const TAG_FK: ForeignKey = ForeignKey {
    foreign_table: "tags",
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::Cascade,
};

// =============================================================================
// Version 1
// =============================================================================

/// Catalog entities. `flags` packs the rating in its low three bits.
const ENTITIES_TABLE_V1: Table = Table {
    name: "entities",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("filename", &SqlType::Text, non_null = true),
        sqlite_column!(
            "flags",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
    ],
    indices: &[],
    unique_constraints: &[],
};

/// Registered attribute definitions
const METADATA_KEYS_TABLE_V1: Table = Table {
    name: "metadata_keys",
    columns: &[
        sqlite_column!("key", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("tagname", &SqlType::Text, non_null = true, is_unique = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!(
            "internal",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "visible",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("1")
        ),
        sqlite_column!(
            "private",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "display_order",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
    ],
    indices: &[],
    unique_constraints: &[],
};

/// Attribute values, one row per (entity, key) in the normal case
const METADATA_VALUES_TABLE_V1: Table = Table {
    name: "metadata_values",
    columns: &[
        sqlite_column!(
            "entity_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ENTITY_FK)
        ),
        sqlite_column!(
            "key",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&METADATA_KEY_FK)
        ),
        sqlite_column!("value", &SqlType::Text, non_null = true),
    ],
    indices: &[
        ("idx_metadata_values_entity", "entity_id"),
        ("idx_metadata_values_key_value", "key, value"),
    ],
    unique_constraints: &[],
};

const TAGS_TABLE_V1: Table = Table {
    name: "tags",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text, non_null = true, is_unique = true),
    ],
    indices: &[],
    unique_constraints: &[],
};

const TAGGED_ENTITIES_TABLE_V1: Table = Table {
    name: "tagged_entities",
    columns: &[
        sqlite_column!(
            "entity_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ENTITY_FK)
        ),
        sqlite_column!(
            "tag_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&TAG_FK)
        ),
    ],
    indices: &[("idx_tagged_entities_tag", "tag_id")],
    unique_constraints: &[&["entity_id", "tag_id"]],
};

const COLOR_LABELS_TABLE_V1: Table = Table {
    name: "color_labels",
    columns: &[
        sqlite_column!(
            "entity_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ENTITY_FK)
        ),
        sqlite_column!("color", &SqlType::Integer, non_null = true),
    ],
    indices: &[],
    unique_constraints: &[&["entity_id", "color"]],
};

const SELECTED_ENTITIES_TABLE_V1: Table = Table {
    name: "selected_entities",
    columns: &[sqlite_column!(
        "entity_id",
        &SqlType::Integer,
        is_primary_key = true,
        foreign_key = Some(&ENTITY_FK)
    )],
    indices: &[],
    unique_constraints: &[],
};

/// Key-value settings, integer preferences stored as text
const SETTINGS_TABLE_V1: Table = Table {
    name: "settings",
    columns: &[
        sqlite_column!("key", &SqlType::Text, is_primary_key = true),
        sqlite_column!("value", &SqlType::Text, non_null = true),
    ],
    indices: &[],
    unique_constraints: &[],
};

pub const METADATA_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[
        ENTITIES_TABLE_V1,
        METADATA_KEYS_TABLE_V1,
        METADATA_VALUES_TABLE_V1,
        TAGS_TABLE_V1,
        TAGGED_ENTITIES_TABLE_V1,
        COLOR_LABELS_TABLE_V1,
        SELECTED_ENTITIES_TABLE_V1,
        SETTINGS_TABLE_V1,
    ],
}];
