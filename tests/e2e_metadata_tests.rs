//! End-to-end tests for metadata writes and reads through the engine.

mod common;

use catalog_metadata::metadata::{diff, EngineOptions, EntityOutcome, MetadataValues, SidecarMode};
use catalog_metadata::metadata_store::{EntityId, MetadataStore, NewAttribute, Snapshot, Target};
use catalog_metadata::metadata::RegistryError;
use catalog_metadata::settings::{import_flag_key, SettingsStore};
use common::*;

// =============================================================================
// Merge, overwrite and removal through the empty sentinel
// =============================================================================

#[test]
fn test_merge_into_empty_entity() {
    let catalog = TestCatalog::spawn();
    let entity = catalog.add_entity("a.raw");
    let creator = catalog.key(CREATOR_TAG);

    let before = catalog.engine.snapshot(entity).unwrap();
    let report = catalog
        .engine
        .set(Some(entity), CREATOR_TAG, "Ann", true)
        .unwrap();
    let after = catalog.engine.snapshot(entity).unwrap();

    assert_eq!(report.outcomes, vec![(entity, EntityOutcome::Updated)]);
    assert_eq!(after, Snapshot::new().with(creator, "Ann"));
    let delta = diff(entity, &before, &after);
    assert!(delta.removals.is_empty());
    assert_eq!(delta.insertions.len(), 1);
    assert_eq!(delta.insertions[0].value, "Ann");
}

#[test]
fn test_overwrite_replaces_value() {
    let catalog = TestCatalog::spawn();
    let entity = catalog.add_entity("a.raw");
    let creator = catalog.key(CREATOR_TAG);
    catalog
        .engine
        .set(Some(entity), CREATOR_TAG, "Ann", true)
        .unwrap();

    let before = catalog.engine.snapshot(entity).unwrap();
    catalog
        .engine
        .set(Some(entity), CREATOR_TAG, "Bea", true)
        .unwrap();
    let after = catalog.engine.snapshot(entity).unwrap();

    assert_eq!(after, Snapshot::new().with(creator, "Bea"));
    let delta = diff(entity, &before, &after);
    assert_eq!(delta.removals, vec![creator]);
    assert_eq!(delta.insertions.len(), 1);
    assert_eq!(delta.insertions[0].value, "Bea");
}

#[test]
fn test_empty_value_removes_key() {
    let catalog = TestCatalog::spawn();
    let entity = catalog.add_entity("a.raw");
    catalog
        .engine
        .set(Some(entity), CREATOR_TAG, "Bea", true)
        .unwrap();

    let report = catalog.engine.set(Some(entity), CREATOR_TAG, "", true).unwrap();

    assert_eq!(report.updated(), vec![entity]);
    assert!(catalog.engine.snapshot(entity).unwrap().is_empty());
}

#[test]
fn test_whitespace_only_value_removes_key() {
    let catalog = TestCatalog::spawn();
    let entity = catalog.add_entity("a.raw");
    catalog
        .engine
        .set(Some(entity), TITLE_TAG, "Dunes", false)
        .unwrap();

    catalog
        .engine
        .set(Some(entity), TITLE_TAG, "   \t", false)
        .unwrap();

    assert_eq!(catalog.value(entity, TITLE_TAG), None);
}

#[test]
fn test_reapplying_same_value_is_unchanged() {
    let catalog = TestCatalog::spawn();
    let entity = catalog.add_entity("a.raw");
    catalog
        .engine
        .set(Some(entity), CREATOR_TAG, "Ann", true)
        .unwrap();

    let report = catalog
        .engine
        .set(Some(entity), CREATOR_TAG, " Ann ", true)
        .unwrap();

    assert_eq!(report.outcomes, vec![(entity, EntityOutcome::Unchanged)]);
    assert_eq!(catalog.value(entity, CREATOR_TAG).as_deref(), Some("Ann"));
}

#[test]
fn test_batch_continues_past_missing_entity() {
    let catalog = TestCatalog::spawn();
    let a = catalog.add_entity("a.raw");
    let b = catalog.add_entity("b.raw");

    let report = catalog.engine.set_list(
        &[a, EntityId(9999), EntityId(-1), b],
        &[(CREATOR_TAG.to_string(), Some("Ann".to_string()))],
        true,
    );

    assert_eq!(report.updated(), vec![a, b]);
    assert_eq!(report.failed(), vec![EntityId(9999)]);
    assert_eq!(report.outcomes[2], (EntityId(-1), EntityOutcome::Skipped));
}

// =============================================================================
// Bulk operations
// =============================================================================

#[test]
fn test_set_list_id_replace_drops_other_keys() {
    let catalog = TestCatalog::spawn();
    let entity = catalog.add_entity("a.raw");
    let creator = catalog.key(CREATOR_TAG);
    let title = catalog.key(TITLE_TAG);
    catalog.engine.set_list_id(
        &[entity],
        Snapshot::new().with(creator, "Ann").with(title, "Dunes"),
        false,
        true,
    );

    catalog
        .engine
        .set_list_id(&[entity], Snapshot::new().with(title, "Sea"), true, true);

    assert_eq!(
        catalog.engine.snapshot(entity).unwrap(),
        Snapshot::new().with(title, "Sea")
    );
}

#[test]
fn test_clear_keeps_internal_and_hidden_keys() {
    let catalog = TestCatalog::spawn();
    let a = catalog.add_entity("a.raw");
    let b = catalog.add_entity("b.raw");
    for entity in [a, b] {
        catalog.engine.set_list(
            &[entity],
            &[
                (CREATOR_TAG.to_string(), Some("Ann".to_string())),
                (DESCRIPTION_TAG.to_string(), Some("Dunes at dusk".to_string())),
                (NOTES_TAG.to_string(), Some("check focus".to_string())),
                (IMPORT_ID_TAG.to_string(), Some(format!("{}-2024", entity))),
            ],
            false,
        );
    }

    let report = catalog.engine.clear(&[a, b], true);

    assert_eq!(report.updated(), vec![a, b]);
    for entity in [a, b] {
        assert_eq!(catalog.value(entity, CREATOR_TAG), None);
        assert_eq!(catalog.value(entity, DESCRIPTION_TAG), None);
        assert_eq!(
            catalog.value(entity, NOTES_TAG).as_deref(),
            Some("check focus")
        );
        assert!(catalog.value(entity, IMPORT_ID_TAG).is_some());
    }
}

#[test]
fn test_remove_keys_only_touches_listed_key() {
    let catalog = TestCatalog::spawn();
    let entity = catalog.add_entity("a.raw");
    catalog.engine.set_list(
        &[entity],
        &[
            (CREATOR_TAG.to_string(), Some("Ann".to_string())),
            (TITLE_TAG.to_string(), Some("Dunes".to_string())),
        ],
        false,
    );

    catalog
        .engine
        .remove_keys(&[entity], &[catalog.key(TITLE_TAG)], true);

    assert_eq!(catalog.value(entity, CREATOR_TAG).as_deref(), Some("Ann"));
    assert_eq!(catalog.value(entity, TITLE_TAG), None);
}

// =============================================================================
// Target resolution
// =============================================================================

#[test]
fn test_set_without_entity_prefers_hover_outside_selection() {
    let catalog = TestCatalog::spawn();
    let a = catalog.add_entity("a.raw");
    let b = catalog.add_entity("b.raw");
    let c = catalog.add_entity("c.raw");
    catalog.selection.select(&[a, b]).unwrap();
    catalog.selection.set_hovered(Some(c));

    catalog.engine.set(None, CREATOR_TAG, "Ann", false).unwrap();

    assert_eq!(catalog.value(c, CREATOR_TAG).as_deref(), Some("Ann"));
    assert_eq!(catalog.value(a, CREATOR_TAG), None);

    catalog.selection.set_hovered(None);
    catalog.engine.set(None, CREATOR_TAG, "Bea", false).unwrap();

    assert_eq!(catalog.value(a, CREATOR_TAG).as_deref(), Some("Bea"));
    assert_eq!(catalog.value(b, CREATOR_TAG).as_deref(), Some("Bea"));
    assert_eq!(catalog.value(c, CREATOR_TAG).as_deref(), Some("Ann"));
}

#[test]
fn test_set_with_empty_selection_does_nothing() {
    let catalog = TestCatalog::spawn();
    catalog.add_entity("a.raw");

    let report = catalog.engine.set(None, CREATOR_TAG, "Ann", true).unwrap();

    assert!(report.is_empty());
    assert!(!catalog.engine.can_undo());
}

// =============================================================================
// Reads
// =============================================================================

#[test]
fn test_get_selection_ordered_by_value() {
    let catalog = TestCatalog::spawn();
    let a = catalog.add_entity("a.raw");
    let b = catalog.add_entity("b.raw");
    catalog.engine.set(Some(a), CREATOR_TAG, "Zoe", false).unwrap();
    catalog.engine.set(Some(b), CREATOR_TAG, "Ann", false).unwrap();
    catalog.selection.select(&[a, b]).unwrap();

    let values = catalog.engine.get(Target::Selection, CREATOR_TAG).unwrap();

    assert_eq!(
        values,
        MetadataValues::Text(vec!["Ann".to_string(), "Zoe".to_string()])
    );
}

#[test]
fn test_get_resolves_indexed_key_by_prefix() {
    let catalog = TestCatalog::spawn();
    let entity = catalog.add_entity("a.raw");
    catalog
        .engine
        .set(Some(entity), "Xmp.dc.title[0]", "Dunes", false)
        .unwrap();

    let values = catalog
        .engine
        .get(Target::Entity(entity), "Xmp.dc.title[0]")
        .unwrap();

    assert_eq!(values.to_strings(), vec!["Dunes".to_string()]);
}

#[test]
fn test_virtual_keys() {
    let catalog = TestCatalog::spawn();
    let entity = catalog.add_entity("a.raw");
    catalog.store.set_entity_flags(entity, 0x8 | 4).unwrap();
    catalog.store.attach_tag(entity, "places|desert").unwrap();
    catalog.store.attach_tag(entity, "season|autumn").unwrap();
    catalog.store.add_color_label(entity, 3).unwrap();
    catalog.store.add_color_label(entity, 0).unwrap();
    let target = Target::Entity(entity);

    assert_eq!(
        catalog.engine.get(target, "Xmp.xmp.Rating").unwrap(),
        MetadataValues::Rating(vec![3])
    );
    assert_eq!(
        catalog.engine.get(target, "Xmp.dc.subject").unwrap(),
        MetadataValues::Text(vec![
            "places|desert".to_string(),
            "season|autumn".to_string()
        ])
    );
    assert_eq!(
        catalog
            .engine
            .get_locked(target, "Xmp.darktable.colorlabels")
            .unwrap(),
        MetadataValues::ColorLabels(vec![0, 3])
    );
}

#[test]
fn test_rejected_entity_reads_minus_one() {
    let catalog = TestCatalog::spawn();
    let entity = catalog.add_entity("a.raw");

    assert_eq!(
        catalog
            .engine
            .get(Target::Entity(entity), "Xmp.xmp.Rating")
            .unwrap(),
        MetadataValues::Rating(vec![-1])
    );
}

#[test]
fn test_get_unknown_key_is_empty() {
    let catalog = TestCatalog::spawn();
    let entity = catalog.add_entity("a.raw");

    assert!(catalog
        .engine
        .get(Target::Entity(entity), "Xmp.iptc.City")
        .unwrap()
        .is_empty());
}

#[test]
fn test_already_imported_matches_filename_and_datetime() {
    let catalog = TestCatalog::spawn();
    let entity = catalog.add_entity("IMG_0001.CR3");
    catalog
        .engine
        .set(
            Some(entity),
            IMPORT_ID_TAG,
            "IMG_0001.CR3-2024:05:01 10:00:00",
            false,
        )
        .unwrap();

    assert!(catalog
        .engine
        .already_imported("IMG_0001.CR3", "2024:05:01 10:00:00")
        .unwrap());
    assert!(!catalog
        .engine
        .already_imported("IMG_0001.CR3", "2024:05:02 10:00:00")
        .unwrap());
}

// =============================================================================
// Registry
// =============================================================================

#[test]
fn test_duplicate_registration_keeps_key_count() {
    let catalog = TestCatalog::spawn();
    assert_eq!(catalog.engine.registry().len(), STANDARD_KEY_COUNT);

    let result = catalog
        .engine
        .registry()
        .add(NewAttribute::new(CREATOR_TAG, "creator again"));

    assert!(matches!(result, Err(RegistryError::DuplicateTagName(_))));
    assert_eq!(catalog.engine.registry().len(), STANDARD_KEY_COUNT);
}

#[test]
fn test_registry_survives_reopen_in_display_order() {
    let catalog = TestCatalog::spawn();
    catalog
        .engine
        .registry()
        .set_display_order(catalog.key(CREATOR_TAG), 10)
        .unwrap();

    let reopened = catalog.reopen();
    let tags: Vec<String> = reopened
        .engine
        .registry()
        .definitions()
        .into_iter()
        .map(|definition| definition.tag_name)
        .collect();

    assert_eq!(tags.len(), STANDARD_KEY_COUNT);
    assert_eq!(tags.first().map(String::as_str), Some(PUBLISHER_TAG));
    assert_eq!(tags.last().map(String::as_str), Some(CREATOR_TAG));
}

#[test]
fn test_registering_seeds_import_flag() {
    let catalog = TestCatalog::spawn();

    assert!(catalog
        .settings
        .key_exists(&import_flag_key("creator"))
        .unwrap());
}

// =============================================================================
// Import pipeline
// =============================================================================

#[test]
fn test_set_import_follows_import_flags_without_sidecars() {
    let catalog = TestCatalog::spawn_with(EngineOptions {
        sidecar_mode: SidecarMode::Never,
        ..EngineOptions::default()
    });
    let entity = catalog.add_entity("a.raw");
    catalog
        .settings
        .set_int(&import_flag_key("publisher"), 0)
        .unwrap();

    assert!(catalog.engine.set_import(entity, CREATOR_TAG, "Ann"));
    assert!(!catalog.engine.set_import(entity, PUBLISHER_TAG, "Press"));
    assert!(!catalog.engine.set_import(entity, IMPORT_ID_TAG, "x"));

    assert_eq!(catalog.value(entity, CREATOR_TAG).as_deref(), Some("Ann"));
    assert_eq!(catalog.value(entity, PUBLISHER_TAG), None);
    assert!(!catalog.engine.can_undo());
}

#[test]
fn test_set_import_writes_internal_keys_with_sidecars() {
    let catalog = TestCatalog::spawn_with(EngineOptions {
        sidecar_mode: SidecarMode::OnImport,
        ..EngineOptions::default()
    });
    let entity = catalog.add_entity("a.raw");

    assert!(catalog
        .engine
        .set_import_locked(entity, IMPORT_ID_TAG, "a.raw-2024"));
    assert_eq!(
        catalog.value(entity, IMPORT_ID_TAG).as_deref(),
        Some("a.raw-2024")
    );
}
