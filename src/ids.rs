use std::fmt;

use uuid::Uuid;

/// Monotone non-negative integer assigned at publish, stable for the
/// lifetime of the message.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SeqId(pub u64);

impl SeqId {
    pub fn next(self) -> Self {
        SeqId(self.0 + 1)
    }
}

impl fmt::Display for SeqId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque 16-byte content identifier used as the primary key into the
/// message store.
#[derive(Clone, Copy, Eq, PartialEq, Hash)]
pub struct Guid(pub Uuid);

impl Guid {
    pub fn new() -> Self {
        Guid(Uuid::new_v4())
    }
}

impl Default for Guid {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Guid({})", self.0)
    }
}

/// Value returned by `fetch` or `publish_delivered`: either a seq id
/// (an ack is expected) or a sentinel meaning none is outstanding.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AckTag {
    Seq(SeqId),
    Blank,
}

/// Opaque transaction id, supplied by the caller.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct TxnId(pub u64);

/// Handle identifying a pending sync-and-commit posted back to the
/// queue's own mailbox (see `Queue::poll_sync_completions`).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct OnSyncId(pub u64);
