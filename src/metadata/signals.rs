//! Fire-and-forget change notifications.

use crate::metadata_store::EntityId;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Mutex;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MetadataSignal {
    /// A mutation batch wrote to these entities.
    MetadataChanged { entities: Vec<EntityId> },
    /// An undo or redo replay finished; the hovered entity may show stale data.
    HoverMetadataChanged,
}

#[derive(Default)]
pub struct SignalBus {
    subscribers: Mutex<Vec<Sender<MetadataSignal>>>,
}

impl SignalBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<MetadataSignal> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.lock().unwrap().push(tx);
        rx
    }

    /// Subscribers whose receiver was dropped are pruned.
    pub fn raise(&self, signal: MetadataSignal) {
        self.subscribers
            .lock()
            .unwrap()
            .retain(|tx| tx.send(signal.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }
}
