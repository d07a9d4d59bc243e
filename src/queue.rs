//! The public queue protocol and startup/shutdown: the
//! orchestrator that ties the pipeline, rate estimator, pending-ack
//! map and transaction manager to the two external collaborators.

use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::Arc;

use tracing::{debug, info};

use crate::clock::Clock;
use crate::config::QueueConfig;
use crate::delta::DeltaRange;
use crate::error::{invariant_violation, QueueError, Result};
use crate::ids::{AckTag, Guid, OnSyncId, SeqId, TxnId};
use crate::metrics::QueueMetrics;
use crate::pending_ack::{PendingAck, PendingAckMap};
use crate::phase::{self, Stores};
use crate::pipeline::Pipeline;
use crate::rate::{RamDuration, RateEstimator, TargetRam};
use crate::residency::{Residency, StoreClass};
use crate::store::{CheckpointTerms, MessageStore, QueueIndex, SyncCompletion};
use crate::transaction::{PendingPublish, TransactionManager};

/// Result of a successful `fetch`.
#[derive(Debug)]
pub struct FetchResult {
    pub body: Vec<u8>,
    pub is_delivered: bool,
    pub ack_tag: AckTag,
    pub len: u64,
}

struct OnSyncEntry {
    publishes: Vec<PendingPublish>,
    acks: Vec<Vec<AckTag>>,
    post_commit: Box<dyn FnOnce() + Send>,
}

/// A single queue's full storage-tier state: the pipeline, its two
/// external collaborators, and everything needed to run the
/// publish/fetch/ack/requeue/transaction protocol on top of it.
pub struct Queue {
    pipeline: Pipeline,
    rate: RateEstimator,
    pending_acks: PendingAckMap,
    txns: TransactionManager,

    next_seq_id: SeqId,
    target_ram: TargetRam,
    transient_threshold: SeqId,
    persistent_ref: Guid,
    transient_ref: Guid,

    index: Box<dyn QueueIndex>,
    persistent_store: Arc<dyn MessageStore>,
    transient_store: Arc<dyn MessageStore>,

    config: QueueConfig,
    metrics: QueueMetrics,
    clock: Arc<dyn Clock>,

    on_sync: HashMap<OnSyncId, OnSyncEntry>,
    next_on_sync_id: u64,
    sync_tx: mpsc::Sender<OnSyncId>,
    sync_rx: mpsc::Receiver<OnSyncId>,
}

impl Queue {
    /// Per-queue init. `persistent_recovered_cleanly` is the
    /// broker-wide result of starting the persistent message store
    /// with the `persistent_ref` extracted from `terms`; when false,
    /// the terms are discarded entirely and fresh refs are minted.
    pub fn init(
        config: QueueConfig,
        clock: Arc<dyn Clock>,
        mut index: Box<dyn QueueIndex>,
        persistent_store: Arc<dyn MessageStore>,
        transient_store: Arc<dyn MessageStore>,
        terms: CheckpointTerms,
        persistent_recovered_cleanly: bool,
    ) -> Result<Self> {
        let (low, next) = index.bounds()?;
        let (persistent_ref, transient_ref, persistent_count) = if persistent_recovered_cleanly {
            match (terms.persistent_ref, terms.transient_ref, terms.persistent_count) {
                (Some(p), Some(t), Some(c)) => (p, t, c),
                _ => (Guid::new(), Guid::new(), next.0.saturating_sub(low.0)),
            }
        } else {
            (Guid::new(), Guid::new(), next.0.saturating_sub(low.0))
        };

        let mut pipeline = Pipeline::new();
        pipeline.set_delta(DeltaRange::new(low, persistent_count, next));
        let transient_threshold = next;

        let now_micros = clock.now_micros();
        let rate = RateEstimator::new(now_micros, persistent_count);
        let (sync_tx, sync_rx) = mpsc::channel();

        let mut queue = Queue {
            pipeline,
            rate,
            pending_acks: PendingAckMap::new(),
            txns: TransactionManager::new(),
            next_seq_id: next,
            target_ram: TargetRam::Infinite,
            transient_threshold,
            persistent_ref,
            transient_ref,
            index,
            persistent_store,
            transient_store,
            config,
            metrics: QueueMetrics::new(),
            clock,
            on_sync: HashMap::new(),
            next_on_sync_id: 0,
            sync_tx,
            sync_rx,
        };

        phase::demand_load(
            &mut queue.pipeline,
            queue.index.as_ref(),
            queue.transient_threshold,
            &mut queue.metrics,
        )?;
        queue.check_invariants()?;
        info!(low = low.0, next = next.0, persistent_count, "queue initialised");
        Ok(queue)
    }

    pub fn len(&self) -> u64 {
        self.pipeline.len()
    }

    pub fn ram_msg_count(&self) -> u64 {
        self.pipeline.ram_msg_count()
    }

    pub fn metrics(&self) -> &QueueMetrics {
        &self.metrics
    }

    fn store_for(&self, class: StoreClass) -> &Arc<dyn MessageStore> {
        match class {
            StoreClass::Persistent => &self.persistent_store,
            StoreClass::Transient => &self.transient_store,
        }
    }

    fn check_invariants(&self) -> Result<()> {
        #[cfg(debug_assertions)]
        {
            if let Some(what) = self.pipeline.violated_invariant() {
                return Err(invariant_violation(what));
            }
        }
        Ok(())
    }

    fn run_phase_change_pass(&mut self) -> Result<()> {
        let stores = Stores {
            transient: self.transient_store.clone(),
            persistent: self.persistent_store.clone(),
        };
        phase::run_pass(
            &mut self.pipeline,
            self.index.as_mut(),
            &stores,
            self.target_ram,
            &self.config,
            &mut self.metrics,
        )
    }

    // --- publish/fetch/ack/requeue -------------------------------------------------

    /// `publish(msg) → state'`.
    pub fn publish(&mut self, body: Vec<u8>, is_persistent: bool) -> Result<SeqId> {
        let is_persistent = is_persistent && self.config.durable;
        let seq_id = self.next_seq_id;
        self.next_seq_id = seq_id.next();
        let guid = Guid::new();

        self.index.publish(guid, seq_id, is_persistent)?;
        self.pipeline.enqueue_publish(Residency::new_alpha(seq_id, guid, is_persistent, body));
        self.rate.record_publish(1);
        self.metrics.publishes += 1;

        self.run_phase_change_pass()?;
        self.check_invariants()?;
        Ok(seq_id)
    }

    /// `publish_delivered(ack_required, msg) → (ack_tag, state')`.
    /// Valid only when the queue is currently empty.
    pub fn publish_delivered(&mut self, ack_required: bool, body: Vec<u8>, is_persistent: bool) -> Result<AckTag> {
        if !self.pipeline.is_empty() {
            return Err(QueueError::Invalid("publish_delivered requires an empty queue"));
        }
        let is_persistent = is_persistent && self.config.durable;
        let seq_id = self.next_seq_id;
        self.next_seq_id = seq_id.next();
        let guid = Guid::new();
        self.index.publish(guid, seq_id, is_persistent)?;
        self.metrics.publishes += 1;

        if !ack_required {
            // No pending ack will ever reference this entry, so its body
            // is never written and the entry is retired on the spot
            // rather than left dangling for a demand-load to resurrect.
            self.index.deliver(&[seq_id])?;
            self.index.ack(&[seq_id])?;
            return Ok(AckTag::Blank);
        }
        let store = self.store_for(if is_persistent { StoreClass::Persistent } else { StoreClass::Transient });
        store.write(guid, &body)?;
        self.index.deliver(&[seq_id])?;
        self.pending_acks.insert(seq_id, PendingAck::Shed { is_persistent, guid });
        Ok(AckTag::Seq(seq_id))
    }

    /// `fetch(ack_required) → (msg, is_delivered, ack_tag, new_len) |
    /// empty`.
    pub fn fetch(&mut self, ack_required: bool) -> Result<Option<FetchResult>> {
        loop {
            if self.pipeline.peek_front().is_some() {
                break;
            }
            if !self.pipeline.needs_promotion() {
                return Ok(None);
            }
            self.promote_for_fetch()?;
        }

        let mut rec = self
            .pipeline
            .dequeue_front()
            .ok_or_else(|| invariant_violation("dequeue after peek found a record"))?;
        rec.is_delivered = true;
        self.rate.record_fetch(1);
        self.metrics.fetches += 1;
        self.index.deliver(&[rec.seq_id])?;

        let body = match rec.body.take() {
            Some(b) => b,
            None => self.store_for(rec.store_class()).read(rec.guid)?,
        };

        let ack_tag = if ack_required {
            let entry = if rec.msg_on_disk {
                PendingAck::Shed { is_persistent: rec.is_persistent, guid: rec.guid }
            } else {
                PendingAck::Resident(rec.clone())
            };
            self.pending_acks.insert(rec.seq_id, entry);
            AckTag::Seq(rec.seq_id)
        } else {
            if rec.msg_on_disk {
                self.store_for(rec.store_class()).remove(&[rec.guid])?;
            }
            self.index.ack(&[rec.seq_id])?;
            AckTag::Blank
        };

        self.check_invariants()?;
        Ok(Some(FetchResult { body, is_delivered: rec.is_delivered, ack_tag, len: self.pipeline.len() }))
    }

    fn promote_for_fetch(&mut self) -> Result<()> {
        if self.pipeline.q3_len() == 0 {
            phase::demand_load(
                &mut self.pipeline,
                self.index.as_ref(),
                self.transient_threshold,
                &mut self.metrics,
            )?;
        }
        if !self.pipeline.promote_one_from_q3() {
            return Err(invariant_violation("needs_promotion but nothing to promote"));
        }
        Ok(())
    }

    /// `ack(ack_tags) → state'`.
    pub fn ack(&mut self, tags: &[AckTag]) -> Result<()> {
        for tag in tags {
            let seq_id = match tag {
                AckTag::Seq(s) => *s,
                AckTag::Blank => continue,
            };
            let entry = self.pending_acks.take(seq_id).ok_or(QueueError::UnknownAckTag)?;
            if let PendingAck::Shed { is_persistent, guid } = entry {
                self.store_for(if is_persistent { StoreClass::Persistent } else { StoreClass::Transient })
                    .remove(&[guid])?;
            }
            self.index.ack(&[seq_id])?;
            self.metrics.acks += 1;
        }
        self.check_invariants()
    }

    /// `requeue(ack_tags) → state'`: re-publishes each previously
    /// delivered message with `is_delivered = true`, retiring its old
    /// index entry and minting a fresh, larger seq id to preserve
    /// monotonicity.
    ///
    /// The requeued record keeps the same GUID and is never rewritten
    /// to the store, so there is exactly one stored reference to it
    /// both before and after this call — `MessageStore::release` (for
    /// dropping a reference while another still holds the body) has
    /// nothing to release here. It's only needed once requeue is
    /// extended to fork a delivered message under a second, independent
    /// GUID.
    pub fn requeue(&mut self, tags: &[AckTag]) -> Result<()> {
        for tag in tags {
            let old_seq_id = match tag {
                AckTag::Seq(s) => *s,
                AckTag::Blank => continue,
            };
            let entry = self.pending_acks.take(old_seq_id).ok_or(QueueError::UnknownAckTag)?;
            let (guid, is_persistent, body) = match entry {
                PendingAck::Resident(rec) => (rec.guid, rec.is_persistent, rec.body.unwrap_or_default()),
                PendingAck::Shed { is_persistent, guid } => {
                    let store = self.store_for(if is_persistent { StoreClass::Persistent } else { StoreClass::Transient });
                    (guid, is_persistent, store.read(guid)?)
                }
            };

            self.index.ack(&[old_seq_id])?;
            let new_seq_id = self.next_seq_id;
            self.next_seq_id = new_seq_id.next();
            self.index.publish(guid, new_seq_id, is_persistent)?;
            self.index.deliver(&[new_seq_id])?;

            let mut rec = Residency::new_alpha(new_seq_id, guid, is_persistent, body);
            rec.is_delivered = true;
            self.pipeline.enqueue_requeued(rec);
            self.metrics.requeues += 1;
        }
        self.run_phase_change_pass()?;
        self.check_invariants()
    }

    /// `purge() → (count, state')`.
    pub fn purge(&mut self) -> Result<u64> {
        let delta = self.pipeline.take_delta();
        let mut count = 0u64;

        if !delta.is_empty() {
            let entries = self.index.read_range(delta.start, delta.end)?;
            let persistent: Vec<Guid> = entries.iter().filter(|e| e.is_persistent).map(|e| e.guid).collect();
            let transient: Vec<Guid> = entries.iter().filter(|e| !e.is_persistent).map(|e| e.guid).collect();
            if !persistent.is_empty() {
                self.persistent_store.remove(&persistent)?;
            }
            if !transient.is_empty() {
                self.transient_store.remove(&transient)?;
            }
            let seq_ids: Vec<SeqId> = entries.iter().map(|e| e.seq_id).collect();
            if !seq_ids.is_empty() {
                self.index.deliver(&seq_ids)?;
                self.index.ack(&seq_ids)?;
            }
            count += entries.len() as u64;
        }

        let drained = self.pipeline.drain_all_resident();
        count += drained.len() as u64;
        let mut persistent_guids = Vec::new();
        let mut transient_guids = Vec::new();
        let mut indexed_seq_ids = Vec::new();
        for rec in &drained {
            if rec.msg_on_disk {
                if rec.is_persistent {
                    persistent_guids.push(rec.guid);
                } else {
                    transient_guids.push(rec.guid);
                }
            }
            if rec.index_on_disk {
                indexed_seq_ids.push(rec.seq_id);
            }
        }
        if !persistent_guids.is_empty() {
            self.persistent_store.remove(&persistent_guids)?;
        }
        if !transient_guids.is_empty() {
            self.transient_store.remove(&transient_guids)?;
        }
        if !indexed_seq_ids.is_empty() {
            self.index.deliver(&indexed_seq_ids)?;
            self.index.ack(&indexed_seq_ids)?;
        }

        debug!(count, "purge");
        self.check_invariants()?;
        Ok(count)
    }

    /// `delete_and_terminate(state)`: purge, drop every pending-ack
    /// entry (unlike clean `terminate`, with no "keep persistent"
    /// variant), then delete the queue-index file.
    pub fn delete_and_terminate(&mut self) -> Result<()> {
        self.purge()?;
        for (_, entry) in self.pending_acks.drain() {
            if let PendingAck::Shed { is_persistent, guid } = entry {
                self.store_for(if is_persistent { StoreClass::Persistent } else { StoreClass::Transient })
                    .remove(&[guid])?;
            }
        }
        self.index.delete_and_terminate()
    }

    /// Clean terminate: flush outstanding sync completions, write any
    /// still-resident pending-ack bodies back to their message store,
    /// and persist checkpoint terms.
    pub fn terminate(&mut self) -> Result<()> {
        self.poll_sync_completions()?;
        for (_, entry) in self.pending_acks.drain() {
            if let PendingAck::Resident(rec) = entry {
                let store = self.store_for(rec.store_class());
                store.write(rec.guid, rec.body.as_deref().unwrap_or(&[]))?;
            }
        }
        let terms = CheckpointTerms {
            persistent_ref: Some(self.persistent_ref),
            transient_ref: Some(self.transient_ref),
            persistent_count: Some(self.pipeline.persistent_count()),
        };
        self.index.terminate(terms)
    }

    // --- transactions -----------------------------------------------------------------

    pub fn tx_publish(&mut self, txn: TxnId, body: Vec<u8>, is_persistent: bool) -> Result<Guid> {
        let is_persistent = is_persistent && self.config.durable;
        let guid = Guid::new();
        if is_persistent {
            self.persistent_store.write(guid, &body)?;
        }
        self.txns.tx_publish(txn, guid, is_persistent, body);
        Ok(guid)
    }

    pub fn tx_ack(&mut self, txn: TxnId, tags: Vec<AckTag>) {
        self.txns.tx_ack(txn, tags);
    }

    /// `tx_rollback(txn)`: discards the transaction, tells the
    /// persistent message store to drop its eagerly-written bodies,
    /// and returns the acks that must be re-applied by the caller.
    pub fn tx_rollback(&mut self, txn: TxnId) -> Result<Vec<Vec<AckTag>>> {
        let buf = self.txns.take(txn).ok_or(QueueError::UnknownTransaction(txn))?;
        let persistent_guids = buf.persistent_guids();
        if !persistent_guids.is_empty() {
            self.persistent_store.remove(&persistent_guids)?;
        }
        Ok(buf.pending_acks)
    }

    /// `tx_commit(txn, post_commit_fn)`. Non-durable transactions (or
    /// ones with no persistent publishes) apply immediately; otherwise
    /// commit suspends behind a `sync` of the persistent GUIDs and
    /// completes later via `poll_sync_completions`.
    pub fn tx_commit(&mut self, txn: TxnId, post_commit: impl FnOnce() + Send + 'static) -> Result<()> {
        let buf = self.txns.take(txn).ok_or(QueueError::UnknownTransaction(txn))?;

        if !self.config.durable || !buf.has_persistent_publish() {
            self.apply_committed(buf.pending_messages, buf.pending_acks)?;
            self.run_phase_change_pass()?;
            self.check_invariants()?;
            post_commit();
            return Ok(());
        }

        let guids = buf.persistent_guids();
        let id = OnSyncId(self.next_on_sync_id);
        self.next_on_sync_id += 1;
        self.on_sync.insert(
            id,
            OnSyncEntry {
                publishes: buf.pending_messages,
                acks: buf.pending_acks,
                post_commit: Box::new(post_commit),
            },
        );
        let tx = self.sync_tx.clone();
        self.persistent_store.sync(&guids, SyncCompletion::new(move || {
            let _ = tx.send(id);
        }))?;
        Ok(())
    }

    /// Drains any sync completions delivered by the persistent message
    /// store since the last call, applying each committed transaction
    /// in turn. Must be driven periodically by the owning actor (e.g.
    /// from its idle-timeout hook).
    pub fn poll_sync_completions(&mut self) -> Result<usize> {
        let mut applied = 0usize;
        while let Ok(id) = self.sync_rx.try_recv() {
            let Some(entry) = self.on_sync.remove(&id) else { continue };
            self.apply_committed(entry.publishes, entry.acks)?;
            (entry.post_commit)();
            applied += 1;
        }
        if applied > 0 {
            self.run_phase_change_pass()?;
            self.check_invariants()?;
        }
        Ok(applied)
    }

    fn apply_committed(&mut self, publishes: Vec<PendingPublish>, acks: Vec<Vec<AckTag>>) -> Result<()> {
        for p in publishes {
            let seq_id = self.next_seq_id;
            self.next_seq_id = seq_id.next();
            self.index.publish(p.guid, seq_id, p.is_persistent)?;
            self.pipeline.enqueue_publish(Residency::new_alpha(seq_id, p.guid, p.is_persistent, p.body));
            self.rate.record_publish(1);
            self.metrics.publishes += 1;
        }
        for batch in acks {
            self.ack(&batch)?;
        }
        Ok(())
    }

    // --- rate control -------------------------------------------------------------------

    pub fn ram_duration(&mut self) -> RamDuration {
        let now = self.clock.now_micros();
        self.rate.ram_duration(now, self.pipeline.ram_msg_count())
    }

    /// `set_ram_duration_target(target, state)`: converts to a
    /// message-count target; only lowering it runs the engine
    /// eagerly, promotion always stays demand-driven.
    pub fn set_ram_duration_target(&mut self, target: RamDuration) -> Result<()> {
        let new_target = self.rate.target_ram_msg_count(target);
        let lowered = new_target.is_strictly_lower_than(self.target_ram);
        self.target_ram = new_target;
        if lowered {
            self.run_phase_change_pass()?;
        }
        self.check_invariants()
    }

    /// Idle-timeout hook: drains outstanding sync completions and runs
    /// one phase-change pass.
    pub fn idle_timeout(&mut self) -> Result<()> {
        self.poll_sync_completions()?;
        self.run_phase_change_pass()
    }
}
