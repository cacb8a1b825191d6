//! SQLite-backed storage for attribute definitions, attribute values and the
//! entity-side data virtual keys read from.

mod models;
mod schema;
mod store;
mod trait_def;

pub use models::*;
pub use schema::METADATA_VERSIONED_SCHEMAS;
pub use store::SqliteMetadataStore;
pub use trait_def::MetadataStore;
