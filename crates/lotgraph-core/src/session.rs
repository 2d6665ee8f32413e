//! # Session Module
//!
//! A Session owns one ledger backend and exposes it through the
//! [`RecordStore`] seam, so services and callers never branch on the
//! storage kind.
//!
//! ## Storage Backends
//!
//! - `InMemory`: uses the in-memory [`Ledger`] (fast, volatile)
//! - `Persistent`: uses [`RedbLedger`] for disk-backed ACID storage

use crate::ledger::{IdWatermark, Ledger, LedgerWrite, PlotRegistry, RecordStore};
use crate::storage::RedbLedger;
use crate::{Actor, Batch, BatchId, LotgraphError, Plot, PlotId, ProcessStep, ProcessStepId};
use std::collections::BTreeSet;
use std::path::Path;

/// Storage backend for a Session.
#[derive(Debug)]
pub enum StorageBackend {
    /// In-memory ledger (fast, volatile).
    InMemory(Ledger),
    /// Disk-backed ledger using redb (ACID, persistent).
    Persistent(RedbLedger),
}

impl Default for StorageBackend {
    fn default() -> Self {
        Self::InMemory(Ledger::new())
    }
}

// NOTE: StorageBackend does NOT implement Clone.
// RedbLedger (database handle) cannot be safely cloned.

/// A Session wraps a storage backend.
#[derive(Debug, Default)]
pub struct Session {
    backend: StorageBackend,
}

impl Session {
    /// Create a new empty session with in-memory storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session with an existing in-memory ledger.
    #[must_use]
    pub fn with_ledger(ledger: Ledger) -> Self {
        Self {
            backend: StorageBackend::InMemory(ledger),
        }
    }

    /// Create a session with persistent redb storage.
    ///
    /// Opens or creates a redb database at the given path.
    pub fn with_redb(path: impl AsRef<Path>) -> Result<Self, LotgraphError> {
        Ok(Self {
            backend: StorageBackend::Persistent(RedbLedger::open(path)?),
        })
    }

    /// Check if using persistent storage.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        matches!(self.backend, StorageBackend::Persistent(_))
    }

    /// Compact the persistent backend. No-op for in-memory storage.
    pub fn compact(&mut self) -> Result<(), LotgraphError> {
        match &mut self.backend {
            StorageBackend::InMemory(_) => Ok(()),
            StorageBackend::Persistent(db) => db.compact(),
        }
    }

    fn store(&self) -> &dyn RecordStore {
        match &self.backend {
            StorageBackend::InMemory(ledger) => ledger,
            StorageBackend::Persistent(db) => db,
        }
    }

    fn store_mut(&mut self) -> &mut dyn RecordStore {
        match &mut self.backend {
            StorageBackend::InMemory(ledger) => ledger,
            StorageBackend::Persistent(db) => db,
        }
    }
}

impl PlotRegistry for Session {
    fn plot(&self, id: PlotId) -> Result<Option<Plot>, LotgraphError> {
        self.store().plot(id)
    }

    fn plots(&self, ids: &BTreeSet<PlotId>) -> Result<Vec<Plot>, LotgraphError> {
        self.store().plots(ids)
    }

    fn upsert_plot(&mut self, plot: Plot) -> Result<(), LotgraphError> {
        self.store_mut().upsert_plot(plot)
    }
}

impl RecordStore for Session {
    fn batch(&self, id: BatchId) -> Result<Option<Batch>, LotgraphError> {
        self.store().batch(id)
    }

    fn batches(&self, ids: &BTreeSet<BatchId>) -> Result<Vec<Batch>, LotgraphError> {
        self.store().batches(ids)
    }

    fn batches_for_recipient(&self, recipient: Actor) -> Result<Vec<Batch>, LotgraphError> {
        self.store().batches_for_recipient(recipient)
    }

    fn process_step(&self, id: ProcessStepId) -> Result<Option<ProcessStep>, LotgraphError> {
        self.store().process_step(id)
    }

    fn process_steps(
        &self,
        ids: &BTreeSet<ProcessStepId>,
    ) -> Result<Vec<ProcessStep>, LotgraphError> {
        self.store().process_steps(ids)
    }

    fn watermark(&self) -> Result<IdWatermark, LotgraphError> {
        self.store().watermark()
    }

    fn commit(&mut self, write: LedgerWrite) -> Result<(), LotgraphError> {
        self.store_mut().commit(write)
    }

    fn batch_count(&self) -> Result<usize, LotgraphError> {
        self.store().batch_count()
    }

    fn active_batch_count(&self) -> Result<usize, LotgraphError> {
        self.store().active_batch_count()
    }

    fn edge_count(&self) -> Result<usize, LotgraphError> {
        self.store().edge_count()
    }

    fn process_step_count(&self) -> Result<usize, LotgraphError> {
        self.store().process_step_count()
    }

    fn plot_count(&self) -> Result<usize, LotgraphError> {
        self.store().plot_count()
    }
}
