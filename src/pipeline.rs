use std::collections::VecDeque;

use crate::delta::DeltaRange;
use crate::ids::SeqId;
use crate::residency::Residency;

/// The five-stage residency pipeline: `Q4 ∥ Q3 ∥ Δ ∥ Q2 ∥ Q1` in
/// strictly increasing seq-id order, oldest (the read head, `Q4`) to
/// newest (the publish-time overflow buffer, `Q1`). See `DESIGN.md`
/// for why this is the operationally consistent container ordering.
///
/// `Q1`/`Q4` hold alpha records (body and position both in RAM). `Q2`
/// and `Q3` hold beta/gamma records (body already shed to disk,
/// position in RAM and, once gamma, also on disk). `Δ` is the coldest
/// tier: a range descriptor with no resident records at all.
#[derive(Debug, Default)]
pub struct Pipeline {
    q1: VecDeque<Residency>,
    q2: VecDeque<Residency>,
    delta: DeltaRange,
    q3: VecDeque<Residency>,
    q4: VecDeque<Residency>,

    ram_msg_count: u64,
    ram_index_count: u64,
    persistent_count: u64,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> u64 {
        self.q1.len() as u64 + self.q2.len() as u64 + self.delta.count + self.q3.len() as u64 + self.q4.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ram_msg_count(&self) -> u64 {
        self.ram_msg_count
    }

    pub fn ram_index_count(&self) -> u64 {
        self.ram_index_count
    }

    pub fn persistent_count(&self) -> u64 {
        self.persistent_count
    }

    pub fn beta_count(&self) -> u64 {
        self.q2.len() as u64 + self.q3.len() as u64
    }

    pub fn delta(&self) -> DeltaRange {
        self.delta
    }

    pub fn q1_len(&self) -> usize {
        self.q1.len()
    }

    pub fn q2_len(&self) -> usize {
        self.q2.len()
    }

    pub fn q3_len(&self) -> usize {
        self.q3.len()
    }

    pub fn q4_len(&self) -> usize {
        self.q4.len()
    }

    pub fn q3_is_empty(&self) -> bool {
        self.q3.is_empty()
    }

    pub fn delta_is_empty(&self) -> bool {
        self.delta.is_empty()
    }

    fn note_inserted(&mut self, r: &Residency) {
        if !r.msg_on_disk {
            self.ram_msg_count += 1;
        }
        if !r.index_on_disk {
            self.ram_index_count += 1;
        }
        if r.is_persistent {
            self.persistent_count += 1;
        }
    }

    fn note_removed(&mut self, r: &Residency) {
        if !r.msg_on_disk {
            self.ram_msg_count -= 1;
        }
        if !r.index_on_disk {
            self.ram_index_count -= 1;
        }
        if r.is_persistent {
            self.persistent_count -= 1;
        }
    }

    /// publish(): Q3 empty -> the whole queue is currently resident in
    /// Q4 alone, so new arrivals join it directly; otherwise they go
    /// to Q1, the publish-side overflow buffer, to avoid jumping the
    /// backlog already queued behind Q4.
    pub fn enqueue_publish(&mut self, rec: Residency) {
        self.note_inserted(&rec);
        if self.q3.is_empty() {
            self.q4.push_back(rec);
        } else {
            self.q1.push_back(rec);
        }
    }

    /// requeue(): always re-enters via the same path as a fresh
    /// publish; the caller sets `is_delivered = true` on the record.
    pub fn enqueue_requeued(&mut self, rec: Residency) {
        self.enqueue_publish(rec);
    }

    pub fn dequeue_front(&mut self) -> Option<Residency> {
        let rec = self.q4.pop_front()?;
        self.note_removed(&rec);
        Some(rec)
    }

    pub fn peek_front(&self) -> Option<&Residency> {
        self.q4.front()
    }

    pub fn needs_promotion(&self) -> bool {
        self.q4.is_empty() && (!self.q3.is_empty() || !self.delta.is_empty())
    }

    /// Moves Q3's oldest element into Q4 (the fetch demand-load step).
    pub fn promote_one_from_q3(&mut self) -> bool {
        match self.q3.pop_front() {
            Some(r) => {
                self.q4.push_back(r);
                true
            }
            None => false,
        }
    }

    // --- alpha -> beta primitives -------------------------------------------------

    pub fn shed_q1_front(&mut self) -> Option<Residency> {
        self.q1.pop_front()
    }

    pub fn shed_q4_back(&mut self) -> Option<Residency> {
        self.q4.pop_back()
    }

    pub fn push_q2_back(&mut self, mut rec: Residency) {
        debug_assert!(rec.msg_on_disk, "alpha->beta record must have shed its body");
        rec.body = None;
        self.note_removed_then_inserted_shed(&rec);
        self.q2.push_back(rec);
    }

    pub fn push_q3_front(&mut self, mut rec: Residency) {
        debug_assert!(rec.msg_on_disk, "alpha->beta record must have shed its body");
        rec.body = None;
        self.note_removed_then_inserted_shed(&rec);
        self.q3.push_front(rec);
    }

    /// `push_q2_back`/`push_q3_front` move a record that was already
    /// counted as alpha (ram_msg_count) into the beta tier; only the
    /// ram_msg_count half of the bookkeeping needs to flip since the
    /// index position stays in RAM either way.
    fn note_removed_then_inserted_shed(&mut self, _rec: &Residency) {
        self.ram_msg_count -= 1;
    }

    // --- beta -> gamma (index shed to disk, in place) ------------------------------

    /// Identifies up to `limit` not-yet-gamma seq ids, preferring Q2's
    /// head then Q3's tail (the ends nearest Δ, readying them for a
    /// cheap coalesce), without mutating anything.
    pub fn unshed_index_candidates(&self, limit: usize) -> Vec<SeqId> {
        let mut ids = Vec::with_capacity(limit);
        for rec in self.q2.iter() {
            if ids.len() >= limit {
                break;
            }
            if !rec.index_on_disk {
                ids.push(rec.seq_id);
            }
        }
        for rec in self.q3.iter().rev() {
            if ids.len() >= limit {
                break;
            }
            if !rec.index_on_disk {
                ids.push(rec.seq_id);
            }
        }
        ids
    }

    /// Flips `index_on_disk` to true for exactly the given seq ids,
    /// which must already have had their index entries made durable.
    pub fn flip_index_on_disk(&mut self, seq_ids: &[SeqId]) -> usize {
        if seq_ids.is_empty() {
            return 0;
        }
        let wanted: std::collections::HashSet<SeqId> = seq_ids.iter().copied().collect();
        let mut flipped = 0;
        for rec in self.q2.iter_mut().chain(self.q3.iter_mut()) {
            if wanted.contains(&rec.seq_id) && !rec.index_on_disk {
                rec.index_on_disk = true;
                self.ram_index_count -= 1;
                flipped += 1;
            }
        }
        flipped
    }

    // --- beta/gamma -> delta --------------------------------------------------------

    pub fn q2_front_seq(&self) -> Option<SeqId> {
        self.q2.front().map(|r| r.seq_id)
    }

    pub fn q2_front_is_gamma(&self) -> bool {
        self.q2.front().map(|r| r.index_on_disk).unwrap_or(false)
    }

    pub fn q3_back_seq(&self) -> Option<SeqId> {
        self.q3.back().map(|r| r.seq_id)
    }

    pub fn q3_back_is_gamma(&self) -> bool {
        self.q3.back().map(|r| r.index_on_disk).unwrap_or(false)
    }

    /// Removes Q2's head and folds it into Δ's high end. Caller must
    /// have already confirmed it is gamma.
    pub fn absorb_q2_front_into_delta(&mut self) -> Option<Residency> {
        let rec = self.q2.pop_front()?;
        self.note_removed(&rec);
        if self.delta.is_empty() {
            self.delta.start = rec.seq_id;
        }
        self.delta.count += 1;
        self.delta.end = rec.seq_id.next();
        Some(rec)
    }

    /// Removes Q3's tail and folds it into Δ's low end. Caller must
    /// have already confirmed it is gamma, and that at least one
    /// element will remain in Q3 (invariants 1/3 require Q3 stay
    /// non-empty while Δ or Q1 are non-empty).
    pub fn absorb_q3_back_into_delta(&mut self) -> Option<Residency> {
        let rec = self.q3.pop_back()?;
        self.note_removed(&rec);
        if self.delta.is_empty() {
            self.delta.start = rec.seq_id;
            self.delta.end = rec.seq_id.next();
        } else {
            self.delta.start = rec.seq_id;
        }
        self.delta.count += 1;
        Some(rec)
    }

    // --- delta -> beta (demand load) ------------------------------------------------

    pub fn set_delta(&mut self, delta: DeltaRange) {
        self.delta = delta;
    }

    pub fn append_loaded_to_q3(&mut self, rec: Residency) {
        self.note_inserted(&rec);
        self.q3.push_back(rec);
    }

    pub fn advance_delta_start(&mut self, new_start: SeqId, removed_count: u64) {
        self.delta.start = new_start;
        self.delta.count = self.delta.count.saturating_sub(removed_count);
        if self.delta.count == 0 {
            self.delta = DeltaRange::blank();
        }
    }

    /// When Δ has just gone blank, Q2's remaining content (if any) can
    /// be concatenated directly onto Q3's tail.
    pub fn concatenate_q2_onto_q3(&mut self) {
        while let Some(rec) = self.q2.pop_front() {
            self.q3.push_back(rec);
        }
    }

    // --- purge / drain ---------------------------------------------------------------

    /// Drains every resident record across Q1/Q2/Q3/Q4 (Δ is reported
    /// separately since it has no resident records to return) in
    /// increasing seq-id order, clearing the pipeline.
    pub fn drain_all_resident(&mut self) -> Vec<Residency> {
        let mut out = Vec::with_capacity(self.q1.len() + self.q2.len() + self.q3.len() + self.q4.len());
        out.extend(self.q4.drain(..));
        out.extend(self.q3.drain(..));
        out.extend(self.q2.drain(..));
        out.extend(self.q1.drain(..));
        self.ram_msg_count = 0;
        self.ram_index_count = 0;
        self.persistent_count = 0;
        out
    }

    pub fn take_delta(&mut self) -> DeltaRange {
        std::mem::replace(&mut self.delta, DeltaRange::blank())
    }

    /// Checks the six structural invariants that must hold after
    /// every public operation returns. Returns the name of the first
    /// violated invariant, if any.
    pub fn violated_invariant(&self) -> Option<&'static str> {
        if !(self.q1.is_empty() || !self.q3.is_empty()) {
            return Some("Q1 empty or Q3 non-empty");
        }
        if !(self.q2.is_empty() || !self.delta.is_empty()) {
            return Some("Q2 empty or delta non-empty");
        }
        if !(self.delta.is_empty() || !self.q3.is_empty()) {
            return Some("delta empty or Q3 non-empty");
        }
        if (self.len() == 0) != (self.q3.is_empty() && self.q4.is_empty()) {
            return Some("len zero iff Q3 and Q4 empty");
        }
        // Monotone walk oldest to newest: Q4, Q3, Δ, Q2, Q1.
        let mut floor: Option<u64> = None;
        for deque in [&self.q4, &self.q3] {
            for rec in deque.iter() {
                if let Some(f) = floor {
                    if rec.seq_id.0 <= f {
                        return Some("seq ids not strictly increasing");
                    }
                }
                floor = Some(rec.seq_id.0);
            }
        }
        if !self.delta.is_empty() {
            if let Some(f) = floor {
                if self.delta.start.0 <= f {
                    return Some("delta overlaps Q3");
                }
            }
            floor = Some(self.delta.end.0 - 1);
        }
        for deque in [&self.q2, &self.q1] {
            for rec in deque.iter() {
                if let Some(f) = floor {
                    if rec.seq_id.0 <= f {
                        return Some("seq ids not strictly increasing");
                    }
                }
                floor = Some(rec.seq_id.0);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::Guid;

    fn alpha(seq: u64) -> Residency {
        Residency::new_alpha(SeqId(seq), Guid::new(), false, vec![seq as u8])
    }

    #[test]
    fn publish_goes_to_q4_while_q3_is_empty() {
        let mut p = Pipeline::new();
        p.enqueue_publish(alpha(0));
        p.enqueue_publish(alpha(1));
        assert_eq!(p.q4_len(), 2);
        assert_eq!(p.q1_len(), 0);
        assert!(p.violated_invariant().is_none());
    }

    #[test]
    fn publish_goes_to_q1_once_q3_is_non_empty() {
        let mut p = Pipeline::new();
        p.enqueue_publish(alpha(0));
        p.append_loaded_to_q3(Residency::new_gamma_stub(SeqId(10), Guid::new(), false, false));
        p.enqueue_publish(alpha(20));
        assert_eq!(p.q1_len(), 1, "Q3 non-empty routes new arrivals to Q1");
        assert!(p.violated_invariant().is_none());
    }

    #[test]
    fn dequeue_returns_fifo_order() {
        let mut p = Pipeline::new();
        for seq in 0..5 {
            p.enqueue_publish(alpha(seq));
        }
        for seq in 0..5 {
            let rec = p.dequeue_front().unwrap();
            assert_eq!(rec.seq_id, SeqId(seq));
        }
        assert!(p.dequeue_front().is_none());
    }

    #[test]
    fn monotonicity_violation_is_detected() {
        let mut p = Pipeline::new();
        p.enqueue_publish(alpha(5));
        p.enqueue_publish(alpha(3));
        assert_eq!(p.violated_invariant(), Some("seq ids not strictly increasing"));
    }

    #[test]
    fn shed_then_flip_moves_ram_index_count() {
        let mut p = Pipeline::new();
        p.enqueue_publish(alpha(0));
        let rec = p.shed_q4_back().unwrap();
        let ram_before = p.ram_msg_count();
        let mut shed = rec;
        shed.msg_on_disk = true;
        p.push_q3_front(shed);
        assert_eq!(p.ram_msg_count(), ram_before - 1);
        assert_eq!(p.ram_index_count(), 1);

        let candidates = p.unshed_index_candidates(10);
        assert_eq!(candidates, vec![SeqId(0)]);
        assert_eq!(p.flip_index_on_disk(&candidates), 1);
        assert_eq!(p.ram_index_count(), 0);
    }
}
