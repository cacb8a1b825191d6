//! Batch metadata mutations and the engine that owns the registry, the undo
//! history and the collaborators.
//!
//! Every write goes through [`MetadataEngine::apply`]: per entity, read the
//! current snapshot, derive the new one from the [`Mutation`], persist the
//! diff. Entities are independent units of work, a failure on one is logged,
//! reported and does not stop the batch.

use super::diff::{cleanup_value, diff};
use super::history::{UndoHistory, DEFAULT_UNDO_DEPTH};
use super::registry::{AttributeRegistry, RegistryView};
use super::selection::SelectionResolver;
use super::signals::{MetadataSignal, SignalBus};
use super::undo::{Direction, UndoGroup, UndoKind};
use super::virtual_keys::{MetadataValues, VirtualKey};
use crate::metadata_store::{
    AttributeDefinition, EntityId, KeyId, MetadataPair, MetadataStore, Snapshot, Target,
};
use crate::settings::{import_flag_key, SettingsStore, METADATA_FLAG_IMPORTED};
use anyhow::Result;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// When sidecar files get written, which also decides whether the import
/// pipeline writes every attribute or only the ones flagged for import.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default, clap::ValueEnum)]
#[value(rename_all = "snake_case")]
pub enum SidecarMode {
    Never,
    #[default]
    OnImport,
    AfterEdit,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mutation {
    /// The payload becomes the entity's whole generic state.
    Replace(Snapshot),
    /// Payload keys overwrite or extend the current state.
    MergeAdd(Snapshot),
    /// Listed keys are dropped from the current state.
    RemoveMatching(Vec<KeyId>),
}

impl Mutation {
    /// New state of an entity currently holding `before`. Values are trimmed.
    pub fn apply_to(&self, before: &Snapshot) -> Snapshot {
        match self {
            Mutation::Replace(payload) => cleaned(payload),
            Mutation::MergeAdd(payload) => {
                let mut after = before.clone();
                after.merge(&cleaned(payload));
                after
            }
            Mutation::RemoveMatching(keys) => {
                let mut after = before.clone();
                after.remove_keys(keys);
                after
            }
        }
    }
}

fn cleaned(payload: &Snapshot) -> Snapshot {
    payload
        .iter()
        .map(|pair| MetadataPair::new(pair.key, cleanup_value(&pair.value)))
        .collect()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntityOutcome {
    Updated,
    Unchanged,
    /// Placeholder or otherwise invalid id.
    Skipped,
    Failed(String),
}

#[derive(Clone, Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<(EntityId, EntityOutcome)>,
    /// Before/after pairs of the updated entities when undo was requested and
    /// the caller records the group itself.
    pub undo: Option<UndoGroup>,
}

impl BatchReport {
    pub fn updated(&self) -> Vec<EntityId> {
        self.with_outcome(|outcome| *outcome == EntityOutcome::Updated)
    }

    pub fn failed(&self) -> Vec<EntityId> {
        self.with_outcome(|outcome| matches!(outcome, EntityOutcome::Failed(_)))
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    fn with_outcome(&self, predicate: impl Fn(&EntityOutcome) -> bool) -> Vec<EntityId> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| predicate(outcome))
            .map(|(entity, _)| *entity)
            .collect()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct EngineOptions {
    pub undo_depth: usize,
    pub sidecar_mode: SidecarMode,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            undo_depth: DEFAULT_UNDO_DEPTH,
            sidecar_mode: SidecarMode::default(),
        }
    }
}

pub struct MetadataEngine {
    store: Arc<dyn MetadataStore>,
    settings: Arc<dyn SettingsStore>,
    selection: Arc<dyn SelectionResolver>,
    registry: AttributeRegistry,
    history: Mutex<UndoHistory>,
    signals: SignalBus,
    sidecar_mode: SidecarMode,
}

impl MetadataEngine {
    /// Build the engine and load the registry from the store.
    pub fn new(
        store: Arc<dyn MetadataStore>,
        settings: Arc<dyn SettingsStore>,
        selection: Arc<dyn SelectionResolver>,
        options: EngineOptions,
    ) -> Result<Self> {
        let registry = AttributeRegistry::new(store.clone(), settings.clone());
        registry.load()?;
        info!(
            "Metadata engine ready: undo depth {}, sidecar mode {:?}",
            options.undo_depth, options.sidecar_mode
        );
        Ok(Self {
            store,
            settings,
            selection,
            registry,
            history: Mutex::new(UndoHistory::new(options.undo_depth)),
            signals: SignalBus::new(),
            sidecar_mode: options.sidecar_mode,
        })
    }

    pub fn registry(&self) -> &AttributeRegistry {
        &self.registry
    }

    pub fn signals(&self) -> &SignalBus {
        &self.signals
    }

    pub fn sidecar_mode(&self) -> SidecarMode {
        self.sidecar_mode
    }

    pub fn can_undo(&self) -> bool {
        self.history.lock().unwrap().can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.lock().unwrap().can_redo()
    }

    /// Entities an action without explicit targets applies to.
    pub fn act_on(&self) -> Result<Vec<EntityId>> {
        self.selection.act_on()
    }

    // =========================================================================
    // Batch core
    // =========================================================================

    /// Apply `mutation` to each entity independently.
    ///
    /// With `record_undo` the report carries an [`UndoGroup`] holding the
    /// before/after pair of every updated entity. Nothing is pushed to the
    /// undo history here.
    pub fn apply(
        &self,
        entities: &[EntityId],
        mutation: &Mutation,
        record_undo: bool,
    ) -> BatchReport {
        let mut group = record_undo.then(|| UndoGroup::new(UndoKind::Metadata));
        let mut outcomes = Vec::with_capacity(entities.len());

        for &entity in entities {
            if !entity.is_valid() {
                outcomes.push((entity, EntityOutcome::Skipped));
                continue;
            }
            let before = match self.store.read_snapshot(entity) {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    warn!("Failed to read metadata of entity {}: {:#}", entity, err);
                    outcomes.push((entity, EntityOutcome::Failed(format!("{:#}", err))));
                    continue;
                }
            };
            let after = mutation.apply_to(&before);
            let delta = diff(entity, &before, &after);
            if delta.is_empty() {
                outcomes.push((entity, EntityOutcome::Unchanged));
                continue;
            }
            if let Err(err) = self.store.apply_delta(entity, &delta) {
                warn!("Failed to write metadata of entity {}: {:#}", entity, err);
                outcomes.push((entity, EntityOutcome::Failed(format!("{:#}", err))));
                continue;
            }
            if let Some(group) = group.as_mut() {
                group.push(entity, before, after);
            }
            outcomes.push((entity, EntityOutcome::Updated));
        }

        BatchReport {
            outcomes,
            undo: group.filter(|g| !g.is_empty()),
        }
    }

    /// [`apply`](Self::apply), then push the undo group to the history as one
    /// step and notify subscribers.
    fn execute(&self, entities: &[EntityId], mutation: &Mutation, record_undo: bool) -> BatchReport {
        if entities.is_empty() {
            return BatchReport::default();
        }
        if record_undo {
            self.history.lock().unwrap().start_group(UndoKind::Metadata);
        }
        let mut report = self.apply(entities, mutation, record_undo);
        if record_undo {
            let mut history = self.history.lock().unwrap();
            if let Some(group) = report.undo.take() {
                history.record(UndoKind::Metadata, group);
            }
            history.end_group();
        }

        let updated = report.updated();
        debug!(
            "Metadata batch on {} entities: {} updated, {} failed",
            entities.len(),
            updated.len(),
            report.failed().len()
        );
        if !updated.is_empty() {
            self.signals
                .raise(MetadataSignal::MetadataChanged { entities: updated });
        }
        report
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Set one attribute. `key` is resolved by prefix; an unknown key is a no-op.
    /// Without a valid entity the change applies to [`act_on`](Self::act_on).
    pub fn set(
        &self,
        entity: Option<EntityId>,
        key: &str,
        value: &str,
        record_undo: bool,
    ) -> Result<BatchReport> {
        let Some(key_id) = self.registry.key_id_by_prefix(key) else {
            debug!("Ignoring set of unknown metadata key {}", key);
            return Ok(BatchReport::default());
        };
        let entities = match entity.filter(|id| id.is_valid()) {
            Some(id) => vec![id],
            None => self.selection.act_on()?,
        };
        let payload = Snapshot::new().with(key_id, value);
        Ok(self.execute(&entities, &Mutation::MergeAdd(payload), record_undo))
    }

    /// Import-pipeline write of one attribute, looked up by exact tag name.
    ///
    /// Written when sidecars are enabled, otherwise only for non-internal keys
    /// flagged for import. Never recorded for undo. Returns whether a write
    /// was attempted.
    pub fn set_import(&self, entity: EntityId, key: &str, value: &str) -> bool {
        if !entity.is_valid() {
            return false;
        }
        let definition = self.registry.by_tag_name(key);
        self.import_value(entity, definition.as_ref(), value)
    }

    /// [`set_import`](Self::set_import) with the registry lock held throughout,
    /// for import threads running next to interactive edits.
    pub fn set_import_locked(&self, entity: EntityId, key: &str, value: &str) -> bool {
        if !entity.is_valid() {
            return false;
        }
        let view = self.registry.lock();
        let written = self.import_value(entity, view.by_tag_name(key), value);
        drop(view);
        written
    }

    fn import_value(
        &self,
        entity: EntityId,
        definition: Option<&AttributeDefinition>,
        value: &str,
    ) -> bool {
        let Some(definition) = definition else {
            return false;
        };
        if !self.imports(definition) {
            debug!("Not importing {} for entity {}", definition.tag_name, entity);
            return false;
        }
        let payload = Snapshot::new().with(definition.key, value);
        self.execute(&[entity], &Mutation::MergeAdd(payload), false);
        true
    }

    fn imports(&self, definition: &AttributeDefinition) -> bool {
        if self.sidecar_mode != SidecarMode::Never {
            return true;
        }
        if definition.internal {
            return false;
        }
        let setting = import_flag_key(definition.subkey());
        match self.settings.get_int(&setting) {
            Ok(flags) => flags & METADATA_FLAG_IMPORTED != 0,
            Err(err) => {
                warn!("Failed to read {}: {:#}", setting, err);
                false
            }
        }
    }

    /// Merge several attributes into every entity. Keys are resolved by prefix
    /// under the registry lock; unknown keys and absent values are skipped.
    pub fn set_list(
        &self,
        entities: &[EntityId],
        key_values: &[(String, Option<String>)],
        record_undo: bool,
    ) -> BatchReport {
        let payload: Snapshot = {
            let view = self.registry.lock();
            key_values
                .iter()
                .filter_map(|(key, value)| {
                    let key_id = view.key_id_by_prefix(key)?;
                    let value = value.as_deref()?;
                    Some(MetadataPair::new(key_id, value))
                })
                .collect()
        };
        if payload.is_empty() {
            return BatchReport::default();
        }
        self.execute(entities, &Mutation::MergeAdd(payload), record_undo)
    }

    /// Write a snapshot of key ids: it replaces the generic state when
    /// `clear_first`, and is merged in otherwise.
    pub fn set_list_id(
        &self,
        entities: &[EntityId],
        snapshot: Snapshot,
        clear_first: bool,
        record_undo: bool,
    ) -> BatchReport {
        let mutation = if clear_first {
            Mutation::Replace(snapshot)
        } else {
            Mutation::MergeAdd(snapshot)
        };
        self.execute(entities, &mutation, record_undo)
    }

    /// Remove every visible, non-internal attribute.
    pub fn clear(&self, entities: &[EntityId], record_undo: bool) -> BatchReport {
        let keys = self.registry.lock().user_clearable_keys();
        if keys.is_empty() {
            return BatchReport::default();
        }
        self.execute(entities, &Mutation::RemoveMatching(keys), record_undo)
    }

    /// Remove the listed attributes. Internal and unknown keys are left alone.
    pub fn remove_keys(
        &self,
        entities: &[EntityId],
        keys: &[KeyId],
        record_undo: bool,
    ) -> BatchReport {
        let removable: Vec<KeyId> = {
            let view = self.registry.lock();
            keys.iter()
                .copied()
                .filter(|key| view.by_key_id(*key).is_some_and(|d| !d.internal))
                .collect()
        };
        if removable.is_empty() {
            return BatchReport::default();
        }
        self.execute(entities, &Mutation::RemoveMatching(removable), record_undo)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Values of `key` for the target. Generic keys are resolved by prefix,
    /// then the virtual keys are tried; anything else reads as empty.
    pub fn get(&self, target: Target, key: &str) -> Result<MetadataValues> {
        let key_id = self.registry.key_id_by_prefix(key);
        self.read_values(target, key_id, key)
    }

    /// [`get`](Self::get) with the registry lock held for the whole read.
    pub fn get_locked(&self, target: Target, key: &str) -> Result<MetadataValues> {
        let view = self.registry.lock();
        let values = self.read_with_view(&view, target, key);
        drop(view);
        values
    }

    fn read_with_view(
        &self,
        view: &RegistryView<'_>,
        target: Target,
        key: &str,
    ) -> Result<MetadataValues> {
        self.read_values(target, view.key_id_by_prefix(key), key)
    }

    fn read_values(
        &self,
        target: Target,
        key_id: Option<KeyId>,
        key: &str,
    ) -> Result<MetadataValues> {
        if let Some(key_id) = key_id {
            return Ok(MetadataValues::Text(
                self.store.values_for_key(target, key_id)?,
            ));
        }
        match VirtualKey::from_key(key) {
            Some(virtual_key) => virtual_key.read(self.store.as_ref(), target),
            None => Ok(MetadataValues::empty()),
        }
    }

    /// Generic state of one entity; empty for an invalid id.
    pub fn snapshot(&self, entity: EntityId) -> Result<Snapshot> {
        if !entity.is_valid() {
            return Ok(Snapshot::new());
        }
        self.store.read_snapshot(entity)
    }

    /// Whether some value equals `"<filename>-<datetime>"`.
    pub fn already_imported(&self, filename: &str, datetime: &str) -> Result<bool> {
        if filename.is_empty() || datetime.is_empty() {
            return Ok(false);
        }
        let id = format!("{}-{}", filename, datetime);
        Ok(self.store.count_values_equal(&id)? > 0)
    }

    // =========================================================================
    // Undo
    // =========================================================================

    /// Revert the newest undo step. Returns the touched entities.
    pub fn undo(&self) -> Vec<EntityId> {
        self.replay(Direction::Undo)
    }

    /// Reapply the newest undone step. Returns the touched entities.
    pub fn redo(&self) -> Vec<EntityId> {
        self.replay(Direction::Redo)
    }

    fn replay(&self, direction: Direction) -> Vec<EntityId> {
        let touched = {
            let mut history = self.history.lock().unwrap();
            let step = match direction {
                Direction::Undo => history.undo(),
                Direction::Redo => history.redo(),
            };
            let Some(step) = step else {
                debug!("Nothing to {:?}", direction);
                return Vec::new();
            };

            // Later groups may depend on earlier ones, so undo walks backwards
            let groups: Vec<&UndoGroup> = match direction {
                Direction::Undo => step.groups.iter().rev().collect(),
                Direction::Redo => step.groups.iter().collect(),
            };
            let mut touched: Vec<EntityId> = Vec::new();
            for group in groups {
                for entity in group.replay(self.store.as_ref(), direction) {
                    if !touched.contains(&entity) {
                        touched.push(entity);
                    }
                }
            }
            touched
        };
        self.signals.raise(MetadataSignal::HoverMetadataChanged);
        touched
    }
}
