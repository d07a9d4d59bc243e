use std::collections::HashMap;

use crate::ids::{Guid, SeqId};
use crate::residency::Residency;

/// Either a full residency record, if the body is still in RAM, or
/// just enough to locate it on disk.
#[derive(Clone, Debug)]
pub enum PendingAck {
    Resident(Residency),
    Shed { is_persistent: bool, guid: Guid },
}

/// Tracks delivered-but-unacked messages, sufficient to reconstruct
/// either a requeue or a final ack.
#[derive(Debug, Default)]
pub struct PendingAckMap {
    entries: HashMap<SeqId, PendingAck>,
}

impl PendingAckMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, seq_id: SeqId, entry: PendingAck) {
        self.entries.insert(seq_id, entry);
    }

    pub fn take(&mut self, seq_id: SeqId) -> Option<PendingAck> {
        self.entries.remove(&seq_id)
    }

    pub fn get(&self, seq_id: SeqId) -> Option<&PendingAck> {
        self.entries.get(&seq_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn drain(&mut self) -> Vec<(SeqId, PendingAck)> {
        self.entries.drain().collect()
    }
}
