mod common;

use tierq::{AckTag, Result};

/// Publish 100, fetch 50 with ack required, then purge: purge reports
/// 50 removed, the other 50 delivered-but-unacked entries stay
/// outstanding, and `delete_and_terminate` cleans them up afterwards.
#[test]
fn purge_leaves_pending_acks_for_delete_and_terminate() -> Result<()> {
    let mut h = common::fresh(true, 64, 128)?;
    for i in 0..100 {
        h.queue.publish(vec![i as u8], true)?;
    }

    let mut tags = Vec::new();
    for _ in 0..50 {
        let fetched = h.queue.fetch(true)?.expect("message present");
        tags.push(fetched.ack_tag);
    }
    assert!(tags.iter().all(|t| matches!(t, AckTag::Seq(_))));

    let purged = h.queue.purge()?;
    assert_eq!(purged, 50, "purge removes exactly the un-fetched backlog");
    assert_eq!(h.queue.len(), 0);

    // The 50 pending acks from before the purge are still honourable.
    h.queue.ack(&tags[..25])?;

    h.queue.delete_and_terminate()?;
    assert_eq!(h.persistent_store.len(), 0, "delete_and_terminate cleans up remaining pending acks too");
    Ok(())
}
