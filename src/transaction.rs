//! Transaction buffer: per-transaction pending publishes and acks,
//! kept as a field of the queue state and keyed by a caller-supplied
//! transaction id.

use std::collections::HashMap;

use crate::ids::{AckTag, Guid, TxnId};

/// One publish buffered inside an open transaction, pending commit.
#[derive(Clone, Debug)]
pub struct PendingPublish {
    pub guid: Guid,
    pub is_persistent: bool,
    pub body: Vec<u8>,
}

/// Per-transaction state: buffered publishes in insertion order, and
/// one ack-tag batch per `tx_ack` call.
#[derive(Debug, Default)]
pub struct TxnBuffer {
    pub pending_messages: Vec<PendingPublish>,
    pub pending_acks: Vec<Vec<AckTag>>,
}

impl TxnBuffer {
    fn new() -> Self {
        Self::default()
    }

    /// True if any buffered publish is persistent — the condition
    /// that forces a two-phase, sync-gated commit.
    pub fn has_persistent_publish(&self) -> bool {
        self.pending_messages.iter().any(|m| m.is_persistent)
    }

    pub fn persistent_guids(&self) -> Vec<Guid> {
        self.pending_messages
            .iter()
            .filter(|m| m.is_persistent)
            .map(|m| m.guid)
            .collect()
    }
}

/// Registry of open transactions. Entries are created lazily on first
/// `tx_publish`/`tx_ack` and destroyed on commit or rollback.
#[derive(Debug, Default)]
pub struct TransactionManager {
    txns: HashMap<TxnId, TxnBuffer>,
}

impl TransactionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tx_publish(&mut self, txn: TxnId, guid: Guid, is_persistent: bool, body: Vec<u8>) {
        self.txns
            .entry(txn)
            .or_insert_with(TxnBuffer::new)
            .pending_messages
            .push(PendingPublish { guid, is_persistent, body });
    }

    pub fn tx_ack(&mut self, txn: TxnId, tags: Vec<AckTag>) {
        self.txns.entry(txn).or_insert_with(TxnBuffer::new).pending_acks.push(tags);
    }

    /// Removes and returns a transaction's buffer, if any is open.
    /// Used by both `tx_commit` and `tx_rollback` to drop the entry.
    pub fn take(&mut self, txn: TxnId) -> Option<TxnBuffer> {
        self.txns.remove(&txn)
    }

    pub fn contains(&self, txn: TxnId) -> bool {
        self.txns.contains_key(&txn)
    }
}
