//! The phase-change engine: moves messages between residency
//! tiers to track the current RAM target. Three one-way transitions
//! (alpha→beta, beta→gamma, beta/gamma→delta) and one demand-driven
//! reverse (delta→beta); promotion all the way back to alpha never
//! happens directly, only via a fresh fetch pulling a record through
//! Q3 into Q4.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::QueueConfig;
use crate::error::Result;
use crate::metrics::QueueMetrics;
use crate::pipeline::Pipeline;
use crate::rate::TargetRam;
use crate::residency::StoreClass;
use crate::store::{MessageStore, QueueIndex};

pub struct Stores {
    pub transient: Arc<dyn MessageStore>,
    pub persistent: Arc<dyn MessageStore>,
}

impl Stores {
    fn for_class(&self, class: StoreClass) -> &Arc<dyn MessageStore> {
        match class {
            StoreClass::Persistent => &self.persistent,
            StoreClass::Transient => &self.transient,
        }
    }
}

/// Sheds up to `chunk` alpha records (body currently in RAM) to the
/// beta tier, preferring the ends farthest from the read head: Q1's
/// head first, then Q4's tail.
pub fn shed_alpha(
    pipeline: &mut Pipeline,
    stores: &Stores,
    chunk: usize,
    metrics: &mut QueueMetrics,
) -> Result<usize> {
    let mut moved = 0usize;
    while moved < chunk {
        let Some(rec) = pipeline.shed_q1_front() else { break };
        write_body_if_absent(stores, &rec, rec.body.as_deref())?;
        let mut rec = rec;
        rec.msg_on_disk = true;
        pipeline.push_q2_back(rec);
        moved += 1;
    }
    while moved < chunk {
        let Some(rec) = pipeline.shed_q4_back() else { break };
        write_body_if_absent(stores, &rec, rec.body.as_deref())?;
        let mut rec = rec;
        rec.msg_on_disk = true;
        pipeline.push_q3_front(rec);
        moved += 1;
    }
    if moved > 0 {
        debug!(moved, "alpha -> beta pass");
        metrics.alpha_to_beta_passes += 1;
    }
    Ok(moved)
}

fn write_body_if_absent(
    stores: &Stores,
    rec: &crate::residency::Residency,
    body: Option<&[u8]>,
) -> Result<()> {
    let store = stores.for_class(rec.store_class());
    if !store.contains(rec.guid)? {
        let body = body.unwrap_or(&[]);
        store.write(rec.guid, body)?;
    }
    Ok(())
}

/// Flips `index_on_disk` for up to `config.io_batch` resident index
/// positions, writing their entries to the queue index first.
pub fn shed_indices(
    pipeline: &mut Pipeline,
    index: &mut dyn QueueIndex,
    config: &QueueConfig,
    metrics: &mut QueueMetrics,
) -> Result<usize> {
    let candidates = pipeline.unshed_index_candidates(config.io_batch);
    if candidates.is_empty() {
        return Ok(0);
    }
    index.sync(&candidates)?;
    let flipped = pipeline.flip_index_on_disk(&candidates);
    if flipped > 0 {
        debug!(flipped, "beta -> gamma pass");
        metrics.beta_to_gamma_passes += 1;
    }
    Ok(flipped)
}

/// Coalesces outermost gamma elements of Q2 (head) and Q3 (tail) into
/// Δ, up to `limit` total elements. Forces any outer survivors to
/// gamma first. Always leaves at least one resident element in Q3 so
/// invariants 1 and 3 are never violated by this step alone.
pub fn coalesce_to_delta(
    pipeline: &mut Pipeline,
    index: &mut dyn QueueIndex,
    config: &QueueConfig,
    limit: usize,
    metrics: &mut QueueMetrics,
) -> Result<usize> {
    force_gamma_outer(pipeline, index, config, metrics)?;

    let mut moved = 0usize;
    while moved < limit {
        if !pipeline.q2_front_is_gamma() {
            break;
        }
        if pipeline.absorb_q2_front_into_delta().is_none() {
            break;
        }
        moved += 1;
    }

    if let Some(first_seq) = pipeline.q3_back_seq() {
        let boundary = index.next_segment_boundary(first_seq);
        while moved < limit {
            if pipeline.q3_len() <= 1 {
                break;
            }
            let Some(seq) = pipeline.q3_back_seq() else { break };
            if seq.0 < boundary.0 {
                break;
            }
            if !pipeline.q3_back_is_gamma() {
                break;
            }
            if pipeline.absorb_q3_back_into_delta().is_none() {
                break;
            }
            moved += 1;
        }
    }

    if moved > 0 {
        if pipeline.q3_is_empty() && pipeline.q2_len() > 0 {
            pipeline.concatenate_q2_onto_q3();
        }
        debug!(moved, "beta/gamma -> delta pass");
        metrics.beta_to_delta_passes += 1;
    }
    Ok(moved)
}

fn force_gamma_outer(
    pipeline: &mut Pipeline,
    index: &mut dyn QueueIndex,
    _config: &QueueConfig,
    metrics: &mut QueueMetrics,
) -> Result<()> {
    let limit = pipeline.q2_len() + pipeline.q3_len();
    let candidates = pipeline.unshed_index_candidates(limit);
    if !candidates.is_empty() {
        index.sync(&candidates)?;
        let flipped = pipeline.flip_index_on_disk(&candidates);
        if flipped > 0 {
            metrics.beta_to_gamma_passes += 1;
        }
    }
    Ok(())
}

/// Demand-loads up to one index segment worth of entries from Δ into
/// Q3, dropping orphaned transient entries below `transient_threshold`
/// ("transient-message garbage").
pub fn demand_load(
    pipeline: &mut Pipeline,
    index: &dyn QueueIndex,
    transient_threshold: crate::ids::SeqId,
    metrics: &mut QueueMetrics,
) -> Result<()> {
    let delta = pipeline.delta();
    if delta.is_empty() {
        return Ok(());
    }
    let boundary = index.next_segment_boundary(delta.start).0.min(delta.end.0);
    let entries = index.read_range(delta.start, crate::ids::SeqId(boundary))?;
    for entry in &entries {
        let orphan = entry.seq_id.0 < transient_threshold.0 && !entry.is_persistent;
        if orphan {
            warn!(seq_id = entry.seq_id.0, "dropping orphaned transient entry on reload");
            continue;
        }
        pipeline.append_loaded_to_q3(crate::residency::Residency::new_gamma_stub(
            entry.seq_id,
            entry.guid,
            entry.is_persistent,
            entry.is_delivered,
        ));
    }
    pipeline.advance_delta_start(crate::ids::SeqId(boundary), entries.len() as u64);
    metrics.delta_to_beta_passes += 1;
    metrics.demand_loads_from_store += entries.len() as u64;
    Ok(())
}

/// Runs one phase-change pass honouring the current RAM target: a
/// bounded alpha→beta shed, a bounded beta→gamma flip, and a
/// beta/gamma→delta coalesce that runs whenever beta occupancy sits
/// above the permitted threshold — bounded under a finite non-zero
/// target, effectively unbounded (within a `q3_len() <= 1` guard) once
/// the target drops to exactly zero.
pub fn run_pass(
    pipeline: &mut Pipeline,
    index: &mut dyn QueueIndex,
    stores: &Stores,
    target_ram: TargetRam,
    config: &QueueConfig,
    metrics: &mut QueueMetrics,
) -> Result<()> {
    let chunk = target_ram
        .saturating_sub_count(pipeline.ram_msg_count())
        .min(config.io_batch as u64) as usize;
    if chunk > 0 {
        shed_alpha(pipeline, stores, chunk, metrics)?;
    }

    let permitted = permitted_ram_index_count(pipeline);
    let over = pipeline.ram_index_count().saturating_sub(permitted);
    if over >= config.io_batch as u64 {
        shed_indices(pipeline, index, config, metrics)?;
    }

    if target_ram.is_zero() {
        let limit = (pipeline.q2_len() + pipeline.q3_len()).max(1);
        coalesce_to_delta(pipeline, index, config, limit, metrics)?;
    } else {
        let over_beta = pipeline.beta_count().saturating_sub(permitted);
        if over_beta > 0 {
            let limit = (over_beta as usize).min(config.io_batch).max(1);
            coalesce_to_delta(pipeline, index, config, limit, metrics)?;
        }
    }

    Ok(())
}

/// `permitted = β − ⌊β² / (L − Δc)⌋` when `L > 0`, else infinite.
fn permitted_ram_index_count(pipeline: &Pipeline) -> u64 {
    let len = pipeline.len();
    let delta_count = pipeline.delta().count;
    if len == 0 || len <= delta_count {
        return u64::MAX;
    }
    let beta = pipeline.beta_count();
    beta.saturating_sub(beta.saturating_mul(beta) / (len - delta_count))
}
