//! # Ledger Store
//!
//! The record-store seam of the lotgraph CORE and its in-memory backend.
//!
//! Batches, process steps and edges are append-only. The only mutation a
//! store ever applies to an existing record is clearing a batch's
//! `active` flag, and only as part of a [`LedgerWrite`] commit.
//! All data structures use `BTreeMap` for deterministic ordering.

use crate::{
    Actor, Batch, BatchId, BatchRecord, LotgraphError, Plot, PlotId, ProcessStep, ProcessStepId,
};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// PLOT REGISTRY
// =============================================================================

/// Read access to registered plots of land and their proofs.
///
/// Plot CRUD belongs to an external system; stores keep a copy so that
/// ownership checks and proof counts can be answered locally.
pub trait PlotRegistry {
    /// Lookup a plot by id.
    fn plot(&self, id: PlotId) -> Result<Option<Plot>, LotgraphError>;

    /// Batched lookup. Unknown ids are skipped; results are ordered by id.
    fn plots(&self, ids: &BTreeSet<PlotId>) -> Result<Vec<Plot>, LotgraphError>;

    /// Register or replace a plot.
    fn upsert_plot(&mut self, plot: Plot) -> Result<(), LotgraphError>;

    /// Proof counts for the given plots. Unknown plots are absent.
    fn proof_counts(
        &self,
        ids: &BTreeSet<PlotId>,
    ) -> Result<BTreeMap<PlotId, usize>, LotgraphError> {
        Ok(self
            .plots(ids)?
            .into_iter()
            .map(|p| (p.id, p.proof_count()))
            .collect())
    }
}

// =============================================================================
// RECORD STORE TRAIT
// =============================================================================

/// Next free ids of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IdWatermark {
    pub next_batch: u64,
    pub next_step: u64,
}

/// The RecordStore trait defines the persistence operations of the ledger.
///
/// Reads return batches with `ins`/`outs` joined from the edge relation.
/// All writes go through [`RecordStore::commit`], which applies a whole
/// [`LedgerWrite`] or nothing.
pub trait RecordStore: PlotRegistry {
    /// Point lookup of a batch.
    fn batch(&self, id: BatchId) -> Result<Option<Batch>, LotgraphError>;

    /// Batched lookup. Unknown ids are skipped; results are ordered by id.
    fn batches(&self, ids: &BTreeSet<BatchId>) -> Result<Vec<Batch>, LotgraphError>;

    /// All batches whose recipient is `recipient`, ordered by id.
    fn batches_for_recipient(&self, recipient: Actor) -> Result<Vec<Batch>, LotgraphError>;

    /// Point lookup of a process step.
    fn process_step(&self, id: ProcessStepId) -> Result<Option<ProcessStep>, LotgraphError>;

    /// Batched lookup. Unknown ids are skipped; results are ordered by id.
    fn process_steps(
        &self,
        ids: &BTreeSet<ProcessStepId>,
    ) -> Result<Vec<ProcessStep>, LotgraphError>;

    /// The ids the next write will start allocating from.
    fn watermark(&self) -> Result<IdWatermark, LotgraphError>;

    /// Apply a staged write atomically.
    ///
    /// Fails without changing anything if the write was staged against a
    /// different watermark or references batches that do not exist.
    fn commit(&mut self, write: LedgerWrite) -> Result<(), LotgraphError>;

    /// Total number of batches.
    fn batch_count(&self) -> Result<usize, LotgraphError>;

    /// Number of batches not yet consumed.
    fn active_batch_count(&self) -> Result<usize, LotgraphError>;

    /// Total number of edges.
    fn edge_count(&self) -> Result<usize, LotgraphError>;

    /// Total number of process steps.
    fn process_step_count(&self) -> Result<usize, LotgraphError>;

    /// Total number of registered plots.
    fn plot_count(&self) -> Result<usize, LotgraphError>;
}

// =============================================================================
// STAGED WRITE
// =============================================================================

/// A new batch together with the predecessors it consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedBatch {
    pub record: BatchRecord,
    pub ins: BTreeSet<BatchId>,
}

/// A set of ledger changes built in memory and committed in one step.
///
/// Ids are allocated from the watermark the write was started against, so
/// later batches in the same write can reference earlier ones.
#[derive(Debug, Clone)]
pub struct LedgerWrite {
    base: IdWatermark,
    next: IdWatermark,
    steps: Vec<ProcessStep>,
    batches: Vec<StagedBatch>,
    deactivate: BTreeSet<BatchId>,
}

impl LedgerWrite {
    /// Start a write against the store's current watermark.
    #[must_use]
    pub fn new(base: IdWatermark) -> Self {
        Self {
            base,
            next: base,
            steps: Vec::new(),
            batches: Vec::new(),
            deactivate: BTreeSet::new(),
        }
    }

    /// Allocate a process step id.
    pub fn allocate_step(&mut self) -> ProcessStepId {
        let id = ProcessStepId(self.next.next_step);
        self.next.next_step = self.next.next_step.saturating_add(1);
        id
    }

    /// Allocate a batch id.
    pub fn allocate_batch(&mut self) -> BatchId {
        let id = BatchId(self.next.next_batch);
        self.next.next_batch = self.next.next_batch.saturating_add(1);
        id
    }

    /// Stage a process step.
    pub fn push_step(&mut self, step: ProcessStep) {
        self.steps.push(step);
    }

    /// Stage a batch.
    pub fn push_batch(&mut self, record: BatchRecord, ins: BTreeSet<BatchId>) {
        self.batches.push(StagedBatch { record, ins });
    }

    /// Mark a batch as consumed.
    ///
    /// Batches staged in this same write are deactivated in place; existing
    /// batches are recorded for the store to flip on commit.
    pub fn deactivate(&mut self, id: BatchId) {
        if let Some(staged) = self.batches.iter_mut().find(|b| b.record.id == id) {
            staged.record.active = false;
        } else {
            self.deactivate.insert(id);
        }
    }

    /// Watermark the write was staged against.
    #[must_use]
    pub fn base(&self) -> IdWatermark {
        self.base
    }

    /// Watermark after the write is committed.
    #[must_use]
    pub fn next(&self) -> IdWatermark {
        self.next
    }

    /// Staged process steps, in creation order.
    #[must_use]
    pub fn steps(&self) -> &[ProcessStep] {
        &self.steps
    }

    /// Staged batches, in creation order.
    #[must_use]
    pub fn batches(&self) -> &[StagedBatch] {
        &self.batches
    }

    /// Existing batches to deactivate.
    #[must_use]
    pub fn deactivations(&self) -> &BTreeSet<BatchId> {
        &self.deactivate
    }

    /// Every batch id referenced by the write that must already exist.
    #[must_use]
    pub fn external_references(&self) -> BTreeSet<BatchId> {
        let staged: BTreeSet<BatchId> = self.batches.iter().map(|b| b.record.id).collect();
        self.batches
            .iter()
            .flat_map(|b| b.ins.iter().copied())
            .chain(self.deactivate.iter().copied())
            .filter(|id| !staged.contains(id))
            .collect()
    }
}

// =============================================================================
// IN-MEMORY LEDGER
// =============================================================================

/// The in-memory ledger.
///
/// Uses `BTreeMap` exclusively for deterministic ordering.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    /// Batch storage: BatchId -> record
    batches: BTreeMap<BatchId, BatchRecord>,

    /// Forward adjacency: from -> {to}
    outs: BTreeMap<BatchId, BTreeSet<BatchId>>,

    /// Reverse adjacency: to -> {from}
    ins: BTreeMap<BatchId, BTreeSet<BatchId>>,

    steps: BTreeMap<ProcessStepId, ProcessStep>,

    plots: BTreeMap<PlotId, Plot>,

    next: IdWatermark,
}

impl Ledger {
    /// Create a new empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn materialize(&self, record: &BatchRecord) -> Batch {
        let ins = self.ins.get(&record.id).cloned().unwrap_or_default();
        let outs = self.outs.get(&record.id).cloned().unwrap_or_default();
        record.clone().into_batch(ins, outs)
    }

    /// All batches in id order.
    pub fn all_batches(&self) -> impl Iterator<Item = Batch> + '_ {
        self.batches.values().map(|r| self.materialize(r))
    }
}

impl PlotRegistry for Ledger {
    fn plot(&self, id: PlotId) -> Result<Option<Plot>, LotgraphError> {
        Ok(self.plots.get(&id).cloned())
    }

    fn plots(&self, ids: &BTreeSet<PlotId>) -> Result<Vec<Plot>, LotgraphError> {
        Ok(ids.iter().filter_map(|id| self.plots.get(id).cloned()).collect())
    }

    fn upsert_plot(&mut self, plot: Plot) -> Result<(), LotgraphError> {
        self.plots.insert(plot.id, plot);
        Ok(())
    }
}

impl RecordStore for Ledger {
    fn batch(&self, id: BatchId) -> Result<Option<Batch>, LotgraphError> {
        Ok(self.batches.get(&id).map(|r| self.materialize(r)))
    }

    fn batches(&self, ids: &BTreeSet<BatchId>) -> Result<Vec<Batch>, LotgraphError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.batches.get(id))
            .map(|r| self.materialize(r))
            .collect())
    }

    fn batches_for_recipient(&self, recipient: Actor) -> Result<Vec<Batch>, LotgraphError> {
        Ok(self
            .batches
            .values()
            .filter(|r| r.recipient == recipient)
            .map(|r| self.materialize(r))
            .collect())
    }

    fn process_step(&self, id: ProcessStepId) -> Result<Option<ProcessStep>, LotgraphError> {
        Ok(self.steps.get(&id).cloned())
    }

    fn process_steps(
        &self,
        ids: &BTreeSet<ProcessStepId>,
    ) -> Result<Vec<ProcessStep>, LotgraphError> {
        Ok(ids.iter().filter_map(|id| self.steps.get(id).cloned()).collect())
    }

    fn watermark(&self) -> Result<IdWatermark, LotgraphError> {
        Ok(self.next)
    }

    fn commit(&mut self, write: LedgerWrite) -> Result<(), LotgraphError> {
        if write.base() != self.next {
            return Err(LotgraphError::IoError(
                "ledger changed since the write was staged".to_string(),
            ));
        }
        if let Some(missing) = write
            .external_references()
            .into_iter()
            .find(|id| !self.batches.contains_key(id))
        {
            return Err(LotgraphError::batch_not_found(missing));
        }

        // Everything is checked; apply.
        for step in write.steps() {
            self.steps.insert(step.id, step.clone());
        }
        for staged in write.batches() {
            let id = staged.record.id;
            self.batches.insert(id, staged.record.clone());
            for &parent in &staged.ins {
                self.outs.entry(parent).or_default().insert(id);
                self.ins.entry(id).or_default().insert(parent);
            }
        }
        for id in write.deactivations() {
            if let Some(record) = self.batches.get_mut(id) {
                record.active = false;
            }
        }
        self.next = write.next();
        Ok(())
    }

    fn batch_count(&self) -> Result<usize, LotgraphError> {
        Ok(self.batches.len())
    }

    fn active_batch_count(&self) -> Result<usize, LotgraphError> {
        Ok(self.batches.values().filter(|r| r.active).count())
    }

    fn edge_count(&self) -> Result<usize, LotgraphError> {
        Ok(self.outs.values().map(BTreeSet::len).sum())
    }

    fn process_step_count(&self) -> Result<usize, LotgraphError> {
        Ok(self.steps.len())
    }

    fn plot_count(&self) -> Result<usize, LotgraphError> {
        Ok(self.plots.len())
    }
}

// =============================================================================
// TESTS
// =============================================================================
