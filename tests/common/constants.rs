//! Tag names registered by every test catalog.

pub const CREATOR_TAG: &str = "Xmp.dc.creator";
pub const PUBLISHER_TAG: &str = "Xmp.dc.publisher";
pub const TITLE_TAG: &str = "Xmp.dc.title";
pub const DESCRIPTION_TAG: &str = "Xmp.dc.description";
pub const NOTES_TAG: &str = "Xmp.darktable.notes";
pub const IMPORT_ID_TAG: &str = "Xmp.darktable.import_id";

pub const STANDARD_KEY_COUNT: usize = 6;
