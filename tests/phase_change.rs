mod common;

use tierq::{RamDuration, Result};

const N: usize = 2_000;

/// Publishing at an infinite RAM target keeps everything alpha; once
/// the target drops to zero, repeated phase-change passes converge to
/// zero RAM-resident bodies and a non-empty delta range within a
/// bounded number of passes, and every message still drains correctly
/// afterwards.
#[test]
fn lowering_target_to_zero_demotes_everything_then_drains() -> Result<()> {
    let mut h = common::fresh(false, 200, 256)?;

    let payloads: Vec<Vec<u8>> = (0..N).map(|i| vec![(i % 256) as u8; 1024]).collect();
    for payload in &payloads {
        h.queue.publish(payload.clone(), false)?;
    }
    assert_eq!(h.queue.len(), N as u64);
    assert_eq!(h.queue.ram_msg_count(), N as u64, "nothing shed yet at an infinite target");

    h.queue.set_ram_duration_target(RamDuration::Finite(0.0))?;

    let mut passes = 0;
    while h.queue.ram_msg_count() > 0 {
        h.queue.idle_timeout()?;
        passes += 1;
        assert!(passes < 10_000, "phase-change engine failed to converge");
    }

    assert_eq!(h.queue.len(), N as u64, "no messages lost while demoting");
    assert_eq!(h.queue.ram_msg_count(), 0, "all bodies shed to disk");
    assert!(h.transient_store.len() > 0, "bodies landed in the transient store");

    for payload in &payloads {
        let fetched = h.queue.fetch(false)?.expect("message recovered from disk");
        assert_eq!(&fetched.body, payload, "round-trips byte-identical through disk");
    }
    assert!(h.queue.fetch(false)?.is_none());
    assert_eq!(h.queue.len(), 0);
    Ok(())
}

/// A finite, non-zero RAM-duration target is the engine's actual
/// steady-state control path (as opposed to the infinite-backlog and
/// drop-to-zero edge cases above): publishing under sustained pressure
/// must keep shedding alpha into beta and, once beta occupancy exceeds
/// the permitted threshold, fold the overflow into delta — never
/// leaving a populated Q2/Q3 with an empty delta. That invariant is
/// checked automatically by every `publish` call in a debug build, so
/// this test's real assertion is simply that none of them ever fail.
#[test]
fn finite_nonzero_target_keeps_invariants_through_sustained_publishing() -> Result<()> {
    let mut h = common::fresh(false, 1, 8)?;

    // Prime the rate estimator with a real, steady publish rate so the
    // resulting message-count target is a genuine nonzero finite value
    // rather than rounding down to the same zero the other test covers.
    for i in 0..20u32 {
        h.queue.publish(vec![(i % 256) as u8; 64], false)?;
        h.clock.advance(1_000_000);
        let _ = h.queue.ram_duration();
    }
    h.queue.set_ram_duration_target(RamDuration::Finite(5.0))?;

    let mut payloads: Vec<Vec<u8>> = (0..20u32).map(|i| vec![(i % 256) as u8; 64]).collect();
    for i in 20..500u32 {
        let payload = vec![(i % 256) as u8; 64];
        h.queue.publish(payload.clone(), false)?;
        payloads.push(payload);
        h.clock.advance(1_000_000);
        h.queue.idle_timeout()?;
    }

    assert_eq!(h.queue.len(), 500);
    assert!(h.queue.ram_msg_count() < 500, "sustained pressure sheds some alpha out of RAM");

    for payload in &payloads {
        let fetched = h.queue.fetch(false)?.expect("message present");
        assert_eq!(&fetched.body, payload);
    }
    assert!(h.queue.fetch(false)?.is_none());
    Ok(())
}
