use crate::ids::SeqId;

/// Compact descriptor of a contiguous run of messages that live only
/// on disk: `[start, end)` with a count (some seq ids in the range may
/// have been acked and are therefore absent).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DeltaRange {
    pub start: SeqId,
    pub count: u64,
    pub end: SeqId,
}

impl DeltaRange {
    pub fn blank() -> Self {
        DeltaRange {
            start: SeqId(0),
            count: 0,
            end: SeqId(0),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn new(start: SeqId, count: u64, end: SeqId) -> Self {
        DeltaRange { start, count, end }
    }
}

impl Default for DeltaRange {
    fn default() -> Self {
        Self::blank()
    }
}
