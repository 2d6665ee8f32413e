//! # lotgraph-core
//!
//! The batch provenance graph engine for lotgraph - THE LEDGER.
//!
//! Tracks custody of commodity lots ("batches") through harvest, merge
//! and split/transform events, keeping the full ancestor/descendant DAG
//! for compliance export and anomaly highlighting.
//!
//! ## Architectural Constraints
//!
//! The CORE:
//! - Is the only writer of batches, and writes each call atomically
//! - Is append-only: batches are deactivated, never deleted
//! - Reaches collaborators (plots) through the [`PlotRegistry`] seam and
//!   emits notarization requests as data ([`MintRequest`])
//! - Has NO async, NO network dependencies (pure Rust)

// =============================================================================
// MODULES
// =============================================================================

pub mod creation;
pub mod export;
pub mod ledger;
pub mod lineage;
pub mod primitives;
pub mod query;
pub mod read;
pub mod session;
pub mod storage;
pub mod system;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    Actor, Batch, BatchCreateRequest, BatchId, BatchRecord, CombinedHarvestRequest, CompanyId,
    Edge, ErrorKind, IndividualId, LotgraphError, Plot, PlotId, ProcessStep, ProcessStepId,
    ProcessStepInput, Proof, ProofKind, Weight,
};

// =============================================================================
// RE-EXPORTS: Ledger Engine
// =============================================================================

pub use creation::{CreationEngine, CreationOutcome, CreationReceipt, MintRequest};
pub use export::{ExportSnapshot, TreeNode, export_batch};
pub use ledger::{IdWatermark, Ledger, LedgerWrite, PlotRegistry, RecordStore};
pub use lineage::{LineageEdge, RelatedBatches, propagate_invalidity, read_related_batches};
pub use query::{BatchFilter, BatchSort, SortField, SortOrder};
pub use read::{
    BatchDetails, BatchSummary, has_all_proofs, proof_status, read_batch_by_id,
    read_batches_by_company,
};
pub use session::{Session, StorageBackend};
pub use storage::RedbLedger;

// =============================================================================
// RE-EXPORTS: System (from system module)
// =============================================================================

pub use system::LedgerMetrics;
