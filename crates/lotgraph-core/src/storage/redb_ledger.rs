//! # redb-backed Ledger Storage
//!
//! A disk-backed ledger using the redb embedded database, providing:
//! - ACID transactions (one write transaction per [`LedgerWrite`])
//! - Crash safety (copy-on-write B-trees)
//! - MVCC (concurrent readers, single writer)
//!
//! Records are `postcard`-encoded. Edges are stored twice, keyed
//! `(from, to)` and `(to, from)`, so both `outs` and `ins` are range scans.

use crate::ledger::{IdWatermark, LedgerWrite, PlotRegistry, RecordStore};
use crate::{
    Actor, Batch, BatchId, BatchRecord, LotgraphError, Plot, PlotId, ProcessStep, ProcessStepId,
};
use redb::{
    Database, ReadTransaction, ReadableDatabase, ReadableTable, ReadableTableMetadata,
    TableDefinition,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeSet;
use std::path::Path;

/// Table for batches: BatchId(u64) -> serialized BatchRecord bytes
const BATCHES: TableDefinition<u64, &[u8]> = TableDefinition::new("batches");

/// Table for process steps: ProcessStepId(u64) -> serialized ProcessStep bytes
const STEPS: TableDefinition<u64, &[u8]> = TableDefinition::new("process_steps");

/// Table for forward edges: (from, to) -> process step of `to`
const EDGES: TableDefinition<(u64, u64), u64> = TableDefinition::new("edges");

/// Table for reverse edges: (to, from) -> process step of `to`
const INBOUND: TableDefinition<(u64, u64), u64> = TableDefinition::new("inbound");

/// Table for plots: PlotId(u64) -> serialized Plot bytes
const PLOTS: TableDefinition<u64, &[u8]> = TableDefinition::new("plots");

/// Table for metadata: key string -> value u64
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

const NEXT_BATCH_KEY: &str = "next_batch_id";
const NEXT_STEP_KEY: &str = "next_step_id";

fn io_err(e: impl std::fmt::Display) -> LotgraphError {
    LotgraphError::IoError(e.to_string())
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, LotgraphError> {
    postcard::to_allocvec(value).map_err(|e| LotgraphError::SerializationError(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, LotgraphError> {
    postcard::from_bytes(bytes).map_err(|e| LotgraphError::SerializationError(e.to_string()))
}

/// A disk-backed ledger using redb.
pub struct RedbLedger {
    /// The redb database handle.
    db: Database,
    /// Cached id watermark, refreshed on every commit.
    next: IdWatermark,
}

impl std::fmt::Debug for RedbLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbLedger")
            .field("next", &self.next)
            .finish_non_exhaustive()
    }
}

impl RedbLedger {
    /// Open or create a ledger database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LotgraphError> {
        let db = Database::create(path.as_ref()).map_err(io_err)?;

        // Initialize tables if they don't exist
        {
            let write_txn = db.begin_write().map_err(io_err)?;
            let _ = write_txn.open_table(BATCHES).map_err(io_err)?;
            let _ = write_txn.open_table(STEPS).map_err(io_err)?;
            let _ = write_txn.open_table(EDGES).map_err(io_err)?;
            let _ = write_txn.open_table(INBOUND).map_err(io_err)?;
            let _ = write_txn.open_table(PLOTS).map_err(io_err)?;
            let _ = write_txn.open_table(METADATA).map_err(io_err)?;
            write_txn.commit().map_err(io_err)?;
        }

        let next = {
            let read_txn = db.begin_read().map_err(io_err)?;
            let table = read_txn.open_table(METADATA).map_err(io_err)?;
            let next_batch = table
                .get(NEXT_BATCH_KEY)
                .map_err(io_err)?
                .map(|v| v.value())
                .unwrap_or(0);
            let next_step = table
                .get(NEXT_STEP_KEY)
                .map_err(io_err)?
                .map(|v| v.value())
                .unwrap_or(0);
            IdWatermark {
                next_batch,
                next_step,
            }
        };

        Ok(Self { db, next })
    }

    /// Compact the database (optional optimization).
    pub fn compact(&mut self) -> Result<(), LotgraphError> {
        self.db.compact().map_err(io_err)?;
        Ok(())
    }

    fn read(&self) -> Result<ReadTransaction, LotgraphError> {
        self.db.begin_read().map_err(io_err)
    }

    /// Collect the neighbours of `id` from an edge table keyed `(id, other)`.
    fn neighbours(
        txn: &ReadTransaction,
        table: TableDefinition<(u64, u64), u64>,
        id: BatchId,
    ) -> Result<BTreeSet<BatchId>, LotgraphError> {
        let table = txn.open_table(table).map_err(io_err)?;
        let mut out = BTreeSet::new();
        for entry in table.range((id.0, 0u64)..=(id.0, u64::MAX)).map_err(io_err)? {
            let (key, _) = entry.map_err(io_err)?;
            out.insert(BatchId(key.value().1));
        }
        Ok(out)
    }

    fn materialize(
        txn: &ReadTransaction,
        record: BatchRecord,
    ) -> Result<Batch, LotgraphError> {
        let ins = Self::neighbours(txn, INBOUND, record.id)?;
        let outs = Self::neighbours(txn, EDGES, record.id)?;
        Ok(record.into_batch(ins, outs))
    }

    fn scan_batches<F>(&self, mut keep: F) -> Result<Vec<Batch>, LotgraphError>
    where
        F: FnMut(&BatchRecord) -> bool,
    {
        let read_txn = self.read()?;
        let records = {
            let table = read_txn.open_table(BATCHES).map_err(io_err)?;
            let mut records = Vec::new();
            for entry in table.iter().map_err(io_err)? {
                let (_, value) = entry.map_err(io_err)?;
                let record: BatchRecord = decode(value.value())?;
                if keep(&record) {
                    records.push(record);
                }
            }
            records
        };
        records
            .into_iter()
            .map(|r| Self::materialize(&read_txn, r))
            .collect()
    }

    fn table_len<K, V>(&self, table: TableDefinition<K, V>) -> Result<usize, LotgraphError>
    where
        K: redb::Key + 'static,
        V: redb::Value + 'static,
    {
        let read_txn = self.read()?;
        let table = read_txn.open_table(table).map_err(io_err)?;
        let len = table.len().map_err(io_err)?;
        Ok(usize::try_from(len).unwrap_or(usize::MAX))
    }
}

// =============================================================================
// PLOT REGISTRY IMPLEMENTATION
// =============================================================================

impl PlotRegistry for RedbLedger {
    fn plot(&self, id: PlotId) -> Result<Option<Plot>, LotgraphError> {
        let read_txn = self.read()?;
        let table = read_txn.open_table(PLOTS).map_err(io_err)?;
        match table.get(id.0).map_err(io_err)? {
            Some(data) => Ok(Some(decode(data.value())?)),
            None => Ok(None),
        }
    }

    fn plots(&self, ids: &BTreeSet<PlotId>) -> Result<Vec<Plot>, LotgraphError> {
        let read_txn = self.read()?;
        let table = read_txn.open_table(PLOTS).map_err(io_err)?;
        let mut plots = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(data) = table.get(id.0).map_err(io_err)? {
                plots.push(decode(data.value())?);
            }
        }
        Ok(plots)
    }

    fn upsert_plot(&mut self, plot: Plot) -> Result<(), LotgraphError> {
        let bytes = encode(&plot)?;
        let write_txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut table = write_txn.open_table(PLOTS).map_err(io_err)?;
            table.insert(plot.id.0, bytes.as_slice()).map_err(io_err)?;
        }
        write_txn.commit().map_err(io_err)
    }
}

// =============================================================================
// RECORD STORE IMPLEMENTATION
// =============================================================================

impl RecordStore for RedbLedger {
    fn batch(&self, id: BatchId) -> Result<Option<Batch>, LotgraphError> {
        let read_txn = self.read()?;
        let record = {
            let table = read_txn.open_table(BATCHES).map_err(io_err)?;
            match table.get(id.0).map_err(io_err)? {
                Some(data) => decode::<BatchRecord>(data.value())?,
                None => return Ok(None),
            }
        };
        Self::materialize(&read_txn, record).map(Some)
    }

    fn batches(&self, ids: &BTreeSet<BatchId>) -> Result<Vec<Batch>, LotgraphError> {
        // One read transaction for the whole layer.
        let read_txn = self.read()?;
        let records = {
            let table = read_txn.open_table(BATCHES).map_err(io_err)?;
            let mut records = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(data) = table.get(id.0).map_err(io_err)? {
                    records.push(decode::<BatchRecord>(data.value())?);
                }
            }
            records
        };
        records
            .into_iter()
            .map(|r| Self::materialize(&read_txn, r))
            .collect()
    }

    fn batches_for_recipient(&self, recipient: Actor) -> Result<Vec<Batch>, LotgraphError> {
        self.scan_batches(|r| r.recipient == recipient)
    }

    fn process_step(&self, id: ProcessStepId) -> Result<Option<ProcessStep>, LotgraphError> {
        let read_txn = self.read()?;
        let table = read_txn.open_table(STEPS).map_err(io_err)?;
        match table.get(id.0).map_err(io_err)? {
            Some(data) => Ok(Some(decode(data.value())?)),
            None => Ok(None),
        }
    }

    fn process_steps(
        &self,
        ids: &BTreeSet<ProcessStepId>,
    ) -> Result<Vec<ProcessStep>, LotgraphError> {
        let read_txn = self.read()?;
        let table = read_txn.open_table(STEPS).map_err(io_err)?;
        let mut steps = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(data) = table.get(id.0).map_err(io_err)? {
                steps.push(decode(data.value())?);
            }
        }
        Ok(steps)
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

        // Encode everything before the transaction opens.
        let step_bytes = write
            .steps()
            .iter()
            .map(|s| Ok((s.id.0, encode(s)?)))
            .collect::<Result<Vec<_>, LotgraphError>>()?;
        let batch_bytes = write
            .batches()
            .iter()
            .map(|b| Ok((b.record.id.0, encode(&b.record)?)))
            .collect::<Result<Vec<_>, LotgraphError>>()?;

        let write_txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut batches_table = write_txn.open_table(BATCHES).map_err(io_err)?;
            let mut steps_table = write_txn.open_table(STEPS).map_err(io_err)?;
            let mut edges_table = write_txn.open_table(EDGES).map_err(io_err)?;
            let mut inbound_table = write_txn.open_table(INBOUND).map_err(io_err)?;
            let mut meta_table = write_txn.open_table(METADATA).map_err(io_err)?;

            // Referenced predecessors must exist. Dropping the transaction
            // without commit discards everything.
            for id in write.external_references() {
                if batches_table.get(id.0).map_err(io_err)?.is_none() {
                    return Err(LotgraphError::batch_not_found(id));
                }
            }

            for (id, bytes) in &step_bytes {
                steps_table.insert(*id, bytes.as_slice()).map_err(io_err)?;
            }

            for ((id, bytes), staged) in batch_bytes.iter().zip(write.batches()) {
                batches_table.insert(*id, bytes.as_slice()).map_err(io_err)?;
                let step = staged.record.process_step.0;
                for parent in &staged.ins {
                    edges_table.insert((parent.0, *id), step).map_err(io_err)?;
                    inbound_table.insert((*id, parent.0), step).map_err(io_err)?;
                }
            }

            for id in write.deactivations() {
                let existing = batches_table
                    .get(id.0)
                    .map_err(io_err)?
                    .map(|data| data.value().to_vec());
                let Some(existing) = existing else {
                    return Err(LotgraphError::batch_not_found(*id));
                };
                let mut record: BatchRecord = decode(&existing)?;
                record.active = false;
                let bytes = encode(&record)?;
                batches_table.insert(id.0, bytes.as_slice()).map_err(io_err)?;
            }

            let next = write.next();
            meta_table
                .insert(NEXT_BATCH_KEY, next.next_batch)
                .map_err(io_err)?;
            meta_table
                .insert(NEXT_STEP_KEY, next.next_step)
                .map_err(io_err)?;
        }
        write_txn.commit().map_err(io_err)?;

        // Update in-memory state only after successful commit.
        self.next = write.next();
        Ok(())
    }

    fn batch_count(&self) -> Result<usize, LotgraphError> {
        self.table_len(BATCHES)
    }

    fn active_batch_count(&self) -> Result<usize, LotgraphError> {
        let read_txn = self.read()?;
        let table = read_txn.open_table(BATCHES).map_err(io_err)?;
        let mut count = 0;
        for entry in table.iter().map_err(io_err)? {
            let (_, value) = entry.map_err(io_err)?;
            let record: BatchRecord = decode(value.value())?;
            if record.active {
                count += 1;
            }
        }
        Ok(count)
    }

    fn edge_count(&self) -> Result<usize, LotgraphError> {
        self.table_len(EDGES)
    }

    fn process_step_count(&self) -> Result<usize, LotgraphError> {
        self.table_len(STEPS)
    }

    fn plot_count(&self) -> Result<usize, LotgraphError> {
        self.table_len(PLOTS)
    }
}

// =============================================================================
// TESTS
// =============================================================================
