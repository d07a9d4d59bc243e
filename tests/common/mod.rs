use std::sync::Arc;

use tierq::testkit::{InMemoryIndex, InMemoryStore, ManualClock};
use tierq::{CheckpointTerms, Queue, QueueConfig, Result};

pub struct Harness {
    pub queue: Queue,
    pub persistent_store: Arc<InMemoryStore>,
    pub transient_store: Arc<InMemoryStore>,
    pub clock: Arc<ManualClock>,
}

pub fn fresh(durable: bool, io_batch: usize, segment_size: u64) -> Result<Harness> {
    let persistent_store = Arc::new(InMemoryStore::new());
    let transient_store = Arc::new(InMemoryStore::new());
    let clock = Arc::new(ManualClock::new(1_000_000));
    let index = Box::new(InMemoryIndex::empty(segment_size));
    let config = QueueConfig { io_batch, durable };
    let queue = Queue::init(
        config,
        clock.clone(),
        index,
        persistent_store.clone(),
        transient_store.clone(),
        CheckpointTerms::default(),
        true,
    )?;
    Ok(Harness { queue, persistent_store, transient_store, clock })
}
