mod common;

use tierq::{AckTag, Result};

/// Fetching with an ack required, then requeuing that tag, makes the
/// message available again with `is_delivered = true` on the next
/// fetch.
#[test]
fn requeued_message_comes_back_marked_delivered() -> Result<()> {
    let mut h = common::fresh(true, 64, 128)?;
    h.queue.publish(b"m1".to_vec(), true)?;

    let fetched = h.queue.fetch(true)?.expect("message present");
    assert_eq!(fetched.body, b"m1");
    assert!(fetched.is_delivered, "is_delivered flips true on this very fetch");
    let tag = fetched.ack_tag;
    assert!(matches!(tag, AckTag::Seq(_)));

    h.queue.requeue(&[tag])?;

    let redelivered = h.queue.fetch(true)?.expect("requeued message present");
    assert_eq!(redelivered.body, b"m1");
    assert!(redelivered.is_delivered, "requeued message is marked delivered");
    Ok(())
}
