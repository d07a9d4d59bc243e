//! Storage-tier engine for a per-queue backing store.
//!
//! Holds published messages in order until they are fetched and
//! acknowledged, while continuously rebalancing each message's
//! *residency* across progressively colder tiers — fully in RAM,
//! body-on-disk, body-and-position-on-disk, and a compact off-heap
//! range — to honour a caller-supplied "seconds of messages in RAM"
//! target computed from measured ingress/egress rates.
//!
//! The engine treats the on-disk message store and the per-queue
//! index as external collaborators (see [`store`]) and drives them
//! through [`Queue`], the single public entry point.

pub mod clock;
pub mod config;
pub mod delta;
pub mod error;
pub mod ids;
pub mod metrics;
pub mod pending_ack;
pub mod phase;
pub mod pipeline;
pub mod queue;
pub mod rate;
pub mod residency;
pub mod store;
pub mod transaction;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;

pub use clock::{Clock, SystemClock};
pub use config::{QueueConfig, IO_BATCH};
pub use error::{QueueError, Result};
pub use ids::{AckTag, Guid, OnSyncId, SeqId, TxnId};
pub use metrics::QueueMetrics;
pub use queue::{FetchResult, Queue};
pub use rate::{RamDuration, TargetRam};
pub use store::{CheckpointTerms, IndexEntry, MessageStore, QueueIndex, SyncCompletion};
