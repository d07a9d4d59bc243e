//! In-memory fakes for the two external collaborators, and a clock
//! the tests can step by hand. Not part of the production surface —
//! gated behind `cfg(test)` or the `testkit` feature so integration
//! tests in `tests/` can depend on it too.

use std::collections::{BTreeMap, HashMap};

use parking_lot::Mutex;

use crate::clock::Clock;
use crate::error::{QueueError, Result};
use crate::ids::{Guid, SeqId};
use crate::store::{CheckpointTerms, IndexEntry, MessageStore, QueueIndex, SyncCompletion};

/// A content-addressed blob store backed by a `HashMap`, guarded by a
/// lock since `MessageStore` is shared and reached through `&self`.
pub struct InMemoryStore {
    bodies: Mutex<HashMap<Guid, Vec<u8>>>,
    recovered: bool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        InMemoryStore { bodies: Mutex::new(HashMap::new()), recovered: true }
    }

    /// Builds a store that reports a dirty (non-clean) recovery.
    pub fn new_dirty() -> Self {
        InMemoryStore { bodies: Mutex::new(HashMap::new()), recovered: false }
    }

    pub fn len(&self) -> usize {
        self.bodies.lock().len()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageStore for InMemoryStore {
    fn write(&self, guid: Guid, body: &[u8]) -> Result<()> {
        self.bodies.lock().insert(guid, body.to_vec());
        Ok(())
    }

    fn read(&self, guid: Guid) -> Result<Vec<u8>> {
        self.bodies
            .lock()
            .get(&guid)
            .cloned()
            .ok_or_else(|| QueueError::Store(format!("no body for {guid:?}")))
    }

    fn remove(&self, guids: &[Guid]) -> Result<()> {
        let mut bodies = self.bodies.lock();
        for guid in guids {
            bodies.remove(guid);
        }
        Ok(())
    }

    fn release(&self, guids: &[Guid]) -> Result<()> {
        self.remove(guids)
    }

    fn contains(&self, guid: Guid) -> Result<bool> {
        Ok(self.bodies.lock().contains_key(&guid))
    }

    fn sync(&self, _guids: &[Guid], on_complete: SyncCompletion) -> Result<()> {
        // Every write above is already durable by the time it returns,
        // so the completion fires inline.
        on_complete.complete();
        Ok(())
    }

    fn successfully_recovered(&self) -> bool {
        self.recovered
    }
}

/// A per-queue append log backed by a `BTreeMap`, segmented by a fixed
/// `segment_size` for `next_segment_boundary`.
pub struct InMemoryIndex {
    entries: BTreeMap<u64, IndexEntry>,
    low: SeqId,
    next: SeqId,
    segment_size: u64,
    terminated: Option<CheckpointTerms>,
    deleted: bool,
}

impl InMemoryIndex {
    pub fn new(low: SeqId, next: SeqId, segment_size: u64) -> Self {
        InMemoryIndex {
            entries: BTreeMap::new(),
            low,
            next,
            segment_size: segment_size.max(1),
            terminated: None,
            deleted: false,
        }
    }

    pub fn empty(segment_size: u64) -> Self {
        Self::new(SeqId(0), SeqId(0), segment_size)
    }

    /// Seeds entries directly, as if recovered from disk — used by
    /// recovery tests to simulate a prior run's on-disk state.
    pub fn seed(&mut self, entry: IndexEntry) {
        self.entries.insert(entry.seq_id.0, entry);
        if entry.seq_id.0 >= self.next.0 {
            self.next = entry.seq_id.next();
        }
    }

    pub fn terminated_terms(&self) -> Option<CheckpointTerms> {
        self.terminated
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }
}

impl QueueIndex for InMemoryIndex {
    fn bounds(&self) -> Result<(SeqId, SeqId)> {
        Ok((self.low, self.next))
    }

    fn publish(&mut self, guid: Guid, seq_id: SeqId, is_persistent: bool) -> Result<()> {
        self.entries
            .insert(seq_id.0, IndexEntry { guid, seq_id, is_persistent, is_delivered: false });
        if seq_id.0 >= self.next.0 {
            self.next = seq_id.next();
        }
        Ok(())
    }

    fn deliver(&mut self, seq_ids: &[SeqId]) -> Result<()> {
        for seq_id in seq_ids {
            if let Some(entry) = self.entries.get_mut(&seq_id.0) {
                entry.is_delivered = true;
            }
        }
        Ok(())
    }

    fn ack(&mut self, seq_ids: &[SeqId]) -> Result<()> {
        for seq_id in seq_ids {
            self.entries.remove(&seq_id.0);
        }
        while self.low.0 < self.next.0 && !self.entries.contains_key(&self.low.0) {
            self.low = self.low.next();
        }
        Ok(())
    }

    fn sync(&mut self, _seq_ids: &[SeqId]) -> Result<()> {
        Ok(())
    }

    fn read_range(&self, from: SeqId, to: SeqId) -> Result<Vec<IndexEntry>> {
        Ok(self.entries.range(from.0..to.0).map(|(_, e)| *e).collect())
    }

    fn next_segment_boundary(&self, seq_id: SeqId) -> SeqId {
        SeqId((seq_id.0 / self.segment_size + 1) * self.segment_size)
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn terminate(&mut self, terms: CheckpointTerms) -> Result<()> {
        self.terminated = Some(terms);
        Ok(())
    }

    fn delete_and_terminate(&mut self) -> Result<()> {
        self.deleted = true;
        self.entries.clear();
        Ok(())
    }
}

/// A clock the caller steps by hand, for deterministic rate-estimator
/// tests.
pub struct ManualClock(Mutex<u64>);

impl ManualClock {
    pub fn new(start_micros: u64) -> Self {
        ManualClock(Mutex::new(start_micros))
    }

    pub fn advance(&self, micros: u64) {
        *self.0.lock() += micros;
    }
}

impl Clock for ManualClock {
    fn now_micros(&self) -> u64 {
        *self.0.lock()
    }
}
