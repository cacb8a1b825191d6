//! In-process undo stack.
//!
//! Records pushed between `start_group` and the matching `end_group` form one
//! step; nested groups collapse into the outermost one.

use super::undo::{UndoGroup, UndoKind};
use tracing::debug;

pub const DEFAULT_UNDO_DEPTH: usize = 100;

/// One undo/redo unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UndoStep {
    pub kind: UndoKind,
    pub groups: Vec<UndoGroup>,
}

#[derive(Debug)]
pub struct UndoHistory {
    undo_stack: Vec<UndoStep>,
    redo_stack: Vec<UndoStep>,
    open: Option<OpenGroup>,
    max_depth: usize,
}

#[derive(Debug)]
struct OpenGroup {
    kind: UndoKind,
    nesting: usize,
    groups: Vec<UndoGroup>,
}

impl Default for UndoHistory {
    fn default() -> Self {
        Self::new(DEFAULT_UNDO_DEPTH)
    }
}

impl UndoHistory {
    /// A depth of 0 is bumped to 1.
    pub fn new(max_depth: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            open: None,
            max_depth: max_depth.max(1),
        }
    }

    pub fn start_group(&mut self, kind: UndoKind) {
        match &mut self.open {
            Some(open) => open.nesting += 1,
            None => {
                self.open = Some(OpenGroup {
                    kind,
                    nesting: 1,
                    groups: Vec::new(),
                })
            }
        }
    }

    pub fn end_group(&mut self) {
        let Some(open) = &mut self.open else {
            return;
        };
        open.nesting -= 1;
        if open.nesting > 0 {
            return;
        }
        if let Some(open) = self.open.take() {
            if !open.groups.is_empty() {
                self.push_step(UndoStep {
                    kind: open.kind,
                    groups: open.groups,
                });
            }
        }
    }

    /// Empty groups are dropped.
    pub fn record(&mut self, kind: UndoKind, group: UndoGroup) {
        if group.is_empty() {
            return;
        }
        match &mut self.open {
            Some(open) => open.groups.push(group),
            None => self.push_step(UndoStep {
                kind,
                groups: vec![group],
            }),
        }
    }

    /// Move the newest step to the redo stack and return it for replay.
    pub fn undo(&mut self) -> Option<&UndoStep> {
        let step = self.undo_stack.pop()?;
        self.redo_stack.push(step);
        self.redo_stack.last()
    }

    /// Move the newest undone step back and return it for replay.
    pub fn redo(&mut self) -> Option<&UndoStep> {
        let step = self.redo_stack.pop()?;
        self.undo_stack.push(step);
        self.undo_stack.last()
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }

    fn push_step(&mut self, step: UndoStep) {
        self.undo_stack.push(step);
        self.redo_stack.clear();
        if self.undo_stack.len() > self.max_depth {
            let excess = self.undo_stack.len() - self.max_depth;
            self.undo_stack.drain(0..excess);
            debug!("Evicted {} undo steps", excess);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata_store::{EntityId, KeyId, Snapshot};

    fn group_for(entity: i64) -> UndoGroup {
        let mut group = UndoGroup::new(UndoKind::Metadata);
        group.push(
            EntityId(entity),
            Snapshot::new(),
            Snapshot::new().with(KeyId(1), "v"),
        );
        group
    }

    #[test]
    fn test_record_outside_group_is_one_step() {
        let mut history = UndoHistory::default();
        history.record(UndoKind::Metadata, group_for(1));
        history.record(UndoKind::Metadata, group_for(2));

        assert_eq!(history.undo_len(), 2);
        let step = history.undo().unwrap();
        assert_eq!(step.groups[0].entities(), vec![EntityId(2)]);
        assert_eq!(history.redo_len(), 1);
    }

    #[test]
    fn test_nested_groups_collapse() {
        let mut history = UndoHistory::default();
        history.start_group(UndoKind::Metadata);
        history.record(UndoKind::Metadata, group_for(1));
        history.start_group(UndoKind::Metadata);
        history.record(UndoKind::Metadata, group_for(2));
        history.end_group();
        assert_eq!(history.undo_len(), 0);
        history.end_group();

        assert_eq!(history.undo_len(), 1);
        assert_eq!(history.undo().unwrap().groups.len(), 2);
    }

    #[test]
    fn test_empty_group_records_nothing() {
        let mut history = UndoHistory::default();
        history.start_group(UndoKind::Metadata);
        history.record(UndoKind::Metadata, UndoGroup::new(UndoKind::Metadata));
        history.end_group();
        history.end_group();

        assert!(!history.can_undo());
    }

    #[test]
    fn test_new_record_clears_redo() {
        let mut history = UndoHistory::default();
        history.record(UndoKind::Metadata, group_for(1));
        history.undo();
        assert!(history.can_redo());

        history.record(UndoKind::Metadata, group_for(2));
        assert!(!history.can_redo());
    }

    #[test]
    fn test_undo_redo_move_between_stacks() {
        let mut history = UndoHistory::default();
        history.record(UndoKind::Metadata, group_for(1));

        assert!(history.undo().is_some());
        assert!(history.undo().is_none());
        assert!(history.redo().is_some());
        assert!(history.redo().is_none());
        assert_eq!(history.undo_len(), 1);
    }

    #[test]
    fn test_oldest_steps_evicted() {
        let mut history = UndoHistory::new(2);
        for entity in 1..=3 {
            history.record(UndoKind::Metadata, group_for(entity));
        }

        assert_eq!(history.undo_len(), 2);
        assert_eq!(
            history.undo().unwrap().groups[0].entities(),
            vec![EntityId(3)]
        );
        assert_eq!(
            history.undo().unwrap().groups[0].entities(),
            vec![EntityId(2)]
        );
        assert!(history.undo().is_none());
    }
}
