use crate::ids::{Guid, SeqId};
use crate::error::Result;

/// Completion token for `MessageStore::sync`. The store invokes
/// `complete` once the listed GUIDs are durable; the engine never
/// captures its own mutable state in the closure passed to `sync` —
/// instead the completion is modeled as a message posted back onto
/// the queue's own mailbox (see `Queue::poll_sync_completions`), so
/// the callback here only needs to be `Send + 'static`.
pub struct SyncCompletion(Box<dyn FnOnce() + Send>);

impl SyncCompletion {
    pub fn new(f: impl FnOnce() + Send + 'static) -> Self {
        SyncCompletion(Box::new(f))
    }

    pub fn complete(self) {
        (self.0)()
    }
}

/// A shared, content-addressed blob store keyed by message GUID. One
/// instance per persistence class (transient, persistent); shared by
/// every queue on the node, so implementations are responsible for
/// their own internal locking.
pub trait MessageStore: Send + Sync {
    fn write(&self, guid: Guid, body: &[u8]) -> Result<()>;
    fn read(&self, guid: Guid) -> Result<Vec<u8>>;
    fn remove(&self, guids: &[Guid]) -> Result<()>;
    /// Decrements a reference count without deleting — used by
    /// `requeue` when a body is retained elsewhere.
    fn release(&self, guids: &[Guid]) -> Result<()>;
    fn contains(&self, guid: Guid) -> Result<bool>;
    /// Guarantees the listed GUIDs are durable before invoking the
    /// completion.
    fn sync(&self, guids: &[Guid], on_complete: SyncCompletion) -> Result<()>;
    fn successfully_recovered(&self) -> bool;
}

/// One entry read back from the queue index's on-disk log.
#[derive(Clone, Copy, Debug)]
pub struct IndexEntry {
    pub guid: Guid,
    pub seq_id: SeqId,
    pub is_persistent: bool,
    pub is_delivered: bool,
}

/// Checkpoint terms produced and consumed by this engine, opaque to
/// the queue index itself.
#[derive(Clone, Copy, Debug, Default)]
pub struct CheckpointTerms {
    pub persistent_ref: Option<Guid>,
    pub transient_ref: Option<Guid>,
    pub persistent_count: Option<u64>,
}

/// A per-queue, append-only log of `(seq_id, guid, persistent?,
/// delivered?, acked?)` tuples, segmented, with range-read and
/// ack/deliver marking. Not shared; each queue owns its own index.
pub trait QueueIndex: Send + Sync {
    fn bounds(&self) -> Result<(SeqId, SeqId)>;
    fn publish(&mut self, guid: Guid, seq_id: SeqId, is_persistent: bool) -> Result<()>;
    fn deliver(&mut self, seq_ids: &[SeqId]) -> Result<()>;
    fn ack(&mut self, seq_ids: &[SeqId]) -> Result<()>;
    fn sync(&mut self, seq_ids: &[SeqId]) -> Result<()>;
    fn read_range(&self, from: SeqId, to: SeqId) -> Result<Vec<IndexEntry>>;
    /// Returns the next queue-index segment boundary at or after
    /// `seq_id`; governs how much of a run the engine reads or
    /// converts in one demand-load or coalesce step.
    fn next_segment_boundary(&self, seq_id: SeqId) -> SeqId;
    fn flush(&mut self) -> Result<()>;
    fn terminate(&mut self, terms: CheckpointTerms) -> Result<()>;
    fn delete_and_terminate(&mut self) -> Result<()>;
}
