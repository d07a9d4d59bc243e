mod common;

use std::sync::Arc;

use tierq::testkit::{InMemoryIndex, InMemoryStore, ManualClock};
use tierq::{CheckpointTerms, Guid, IndexEntry, Queue, QueueConfig, Result, SeqId};

/// An index reporting bounds `(1000, 2000)` but terms missing
/// `persistent_ref` mints fresh refs, sets `transient_threshold` to
/// `2000`, builds `Δ = {1000, 1000, 2000}`, and primes Q3 with
/// exactly one index segment's worth.
#[test]
fn init_with_missing_refs_mints_fresh_and_primes_one_segment() -> Result<()> {
    const SEGMENT: u64 = 128;
    let mut index = InMemoryIndex::new(SeqId(1000), SeqId(2000), SEGMENT);
    for seq in 1000..2000u64 {
        index.seed(IndexEntry {
            guid: Guid::new(),
            seq_id: SeqId(seq),
            is_persistent: true,
            is_delivered: false,
        });
    }

    let persistent_store = Arc::new(InMemoryStore::new());
    let transient_store = Arc::new(InMemoryStore::new());
    let clock = Arc::new(ManualClock::new(0));
    let queue = Queue::init(
        QueueConfig { io_batch: 64, durable: true },
        clock,
        Box::new(index),
        persistent_store,
        transient_store,
        CheckpointTerms::default(),
        true,
    )?;

    assert_eq!(queue.len(), 1000, "every entry accounted for, resident or not");
    // next_segment_boundary(1000) with a 128-wide segment is 1024,
    // so exactly 24 entries (1000..=1023) are primed into Q3.
    assert_eq!(queue.metrics().demand_loads_from_store, 24, "primed exactly one segment's worth");
    Ok(())
}
