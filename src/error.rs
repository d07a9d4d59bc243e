use thiserror::Error;
use tracing::error;

use crate::ids::TxnId;

pub type Result<T> = std::result::Result<T, QueueError>;

/// Errors surfaced by the storage-tier engine.
///
/// Disk-operation failures from the message store or queue index are
/// bubbled up unchanged; the engine never retries them locally, since
/// both subsystems own their own durability protocols. Invariant
/// violations are fatal and should cause the supervising process to
/// restart the queue rather than continue operating on corrupt state.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("message store error: {0}")]
    Store(String),
    #[error("queue index error: {0}")]
    Index(String),
    #[error("invariant violated: {0}")]
    Invariant(&'static str),
    #[error("invalid argument: {0}")]
    Invalid(&'static str),
    #[error("unknown transaction {0:?}")]
    UnknownTransaction(TxnId),
    #[error("unknown ack tag")]
    UnknownAckTag,
}

/// Records a fatal structural-invariant violation and returns the
/// corresponding error. Call sites treat the returned error as
/// unrecoverable for the current queue instance.
pub fn invariant_violation(what: &'static str) -> QueueError {
    error!(what, "queue invariant violated");
    QueueError::Invariant(what)
}
