mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tierq::{Result, TxnId};

/// A durable queue's transaction with persistent publishes does not
/// become visible, and its completion callback does not fire, until
/// the persistent store's sync has been polled for completion.
#[test]
fn tx_commit_with_persistent_publishes_defers_until_synced() -> Result<()> {
    let mut h = common::fresh(true, 64, 128)?;
    let txn = TxnId(1);

    h.queue.tx_publish(txn, b"m1".to_vec(), true)?;
    h.queue.tx_publish(txn, b"m2".to_vec(), true)?;
    assert_eq!(h.queue.len(), 0, "buffered publishes are not yet visible");
    assert_eq!(h.persistent_store.len(), 2, "bodies written through eagerly in tx_publish");

    let committed = Arc::new(AtomicBool::new(false));
    let flag = committed.clone();
    h.queue.tx_commit(txn, move || flag.store(true, Ordering::SeqCst))?;
    assert!(!committed.load(Ordering::SeqCst), "callback must not fire before the sync completion is polled");
    assert_eq!(h.queue.len(), 0, "not visible to consumers until the second wakeup");

    let applied = h.queue.poll_sync_completions()?;
    assert_eq!(applied, 1, "exactly one commit completed");
    assert!(committed.load(Ordering::SeqCst), "callback fires once the commit lands");
    assert_eq!(h.queue.len(), 2, "both messages now visible");

    let first = h.queue.fetch(false)?.expect("m1 present");
    assert_eq!(first.body, b"m1");
    let second = h.queue.fetch(false)?.expect("m2 present");
    assert_eq!(second.body, b"m2");
    Ok(())
}

/// A non-durable queue's commit applies immediately with no deferred
/// wakeup, since there is no persistent store to sync against.
#[test]
fn tx_commit_on_non_durable_queue_applies_immediately() -> Result<()> {
    let mut h = common::fresh(false, 64, 128)?;
    let txn = TxnId(7);
    h.queue.tx_publish(txn, b"only".to_vec(), true)?;

    let committed = Arc::new(AtomicBool::new(false));
    let flag = committed.clone();
    h.queue.tx_commit(txn, move || flag.store(true, Ordering::SeqCst))?;

    assert!(committed.load(Ordering::SeqCst), "non-durable commits apply inline");
    assert_eq!(h.queue.len(), 1);
    Ok(())
}

/// Rolling back drops the eagerly-written persistent bodies and hands
/// back the buffered ack batches for the caller to re-apply.
#[test]
fn tx_rollback_drops_eager_bodies() -> Result<()> {
    let mut h = common::fresh(true, 64, 128)?;
    let txn = TxnId(3);
    h.queue.tx_publish(txn, b"doomed".to_vec(), true)?;
    assert_eq!(h.persistent_store.len(), 1);

    let returned_acks = h.queue.tx_rollback(txn)?;
    assert!(returned_acks.is_empty());
    assert_eq!(h.persistent_store.len(), 0, "eager body removed on rollback");
    assert_eq!(h.queue.len(), 0);
    Ok(())
}
