//! Common test infrastructure
//!
//! Integration tests build a [`TestCatalog`] on a temporary database file and
//! drive the public engine API against it.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{TestCatalog, CREATOR_TAG};
//!
//! #[test]
//! fn test_set_creator() {
//!     let catalog = TestCatalog::spawn();
//!     let entity = catalog.add_entity("a.raw");
//!     catalog.engine.set(Some(entity), CREATOR_TAG, "Ann", true).unwrap();
//! }
//! ```

mod constants;
mod fixtures;

pub use constants::*;
pub use fixtures::TestCatalog;
