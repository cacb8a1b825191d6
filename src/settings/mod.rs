//! Configuration store collaborator: integer preferences keyed by name.
//!
//! The metadata engine only uses it for the per-attribute auto-import flag.

mod sqlite_settings_store;

pub use sqlite_settings_store::SqliteSettingsStore;

use anyhow::Result;

/// Attribute is hidden from the metadata panels.
pub const METADATA_FLAG_HIDDEN: i64 = 1;
/// Attribute is excluded from export.
pub const METADATA_FLAG_PRIVATE: i64 = 2;
/// Attribute is written by the import pipeline.
pub const METADATA_FLAG_IMPORTED: i64 = 4;

/// Setting key holding the flags of the attribute with this subkey.
pub fn import_flag_key(subkey: &str) -> String {
    format!("plugins/lighttable/metadata/{}_flag", subkey)
}

pub trait SettingsStore: Send + Sync {
    /// Value of an integer setting, 0 when absent or not a number.
    fn get_int(&self, key: &str) -> Result<i64>;
    fn set_int(&self, key: &str, value: i64) -> Result<()>;
    fn key_exists(&self, key: &str) -> Result<bool>;
}
