//! # Core Type Definitions
//!
//! This module contains all core types for the lotgraph provenance ledger:
//! - Record identifiers (`BatchId`, `ProcessStepId`, `PlotId`, ...)
//! - The polymorphic actor (`Actor`)
//! - Ledger records (`Batch`, `BatchRecord`, `ProcessStep`, `Plot`)
//! - Derived graph edges (`Edge`)
//! - Error types (`LotgraphError`, `ErrorKind`)
//!
//! ## Determinism Guarantees
//!
//! All types in this module:
//! - Use integer arithmetic only (no floating-point)
//! - Implement `Ord` where they key a `BTreeMap`/`BTreeSet`
//! - Use saturating arithmetic for weights to prevent overflow

mod requests;

pub use requests::{BatchCreateRequest, CombinedHarvestRequest, ProcessStepInput};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

// =============================================================================
// IDENTIFIERS
// =============================================================================

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

record_id!(
    /// Identifier of a batch (one node of the provenance DAG).
    BatchId
);
record_id!(
    /// Identifier of a process step (the event that produced batches).
    ProcessStepId
);
record_id!(
    /// Identifier of a registered plot of land.
    PlotId
);
record_id!(
    /// Identifier of a company.
    CompanyId
);
record_id!(
    /// Identifier of an individual (farmers are individuals).
    IndividualId
);

// =============================================================================
// WEIGHT
// =============================================================================

/// Quantity of commodity in base units (grams).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Weight(pub u64);

impl Weight {
    /// Create a new weight.
    #[must_use]
    pub const fn new(units: u64) -> Self {
        Self(units)
    }

    /// Get the raw number of base units.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Add two weights, saturating at `u64::MAX`.
    #[must_use]
    pub const fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    /// Sum an iterator of weights with saturating arithmetic.
    pub fn sum<I: IntoIterator<Item = Self>>(weights: I) -> Self {
        weights
            .into_iter()
            .fold(Self::default(), Self::saturating_add)
    }

    /// Divide this weight evenly into `parts` shares.
    ///
    /// The integer remainder is handed out one unit at a time to the first
    /// shares, so the shares always sum back to `self`. Returns an empty
    /// vector when `parts` is zero.
    #[must_use]
    pub fn split_evenly(self, parts: usize) -> Vec<Self> {
        if parts == 0 {
            return Vec::new();
        }
        let parts_u64 = parts as u64;
        let base = self.0 / parts_u64;
        let remainder = self.0 % parts_u64;
        (0..parts_u64)
            .map(|i| Self(if i < remainder { base + 1 } else { base }))
            .collect()
    }
}

impl fmt::Display for Weight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}g", self.0)
    }
}

// =============================================================================
// ACTOR
// =============================================================================

/// The party a record refers to: exactly one of a company or an individual.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    Company(CompanyId),
    Individual(IndividualId),
}

impl Actor {
    /// The individual id, if this actor is an individual.
    #[must_use]
    pub fn individual(&self) -> Option<IndividualId> {
        match self {
            Self::Individual(id) => Some(*id),
            Self::Company(_) => None,
        }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Company(id) => write!(f, "company:{id}"),
            Self::Individual(id) => write!(f, "individual:{id}"),
        }
    }
}

// =============================================================================
// PROCESS STEP
// =============================================================================

/// The recorded event (harvest, merge, split...) that produced batches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessStep {
    pub id: ProcessStepId,
    pub location: String,
    pub date_of_process: DateTime<Utc>,
    /// When the step was written to the ledger.
    pub date_of_entry: DateTime<Utc>,
    pub process: String,
    pub executed_by: Actor,
    pub recorded_by: Actor,
    /// Present only for origin (harvest) steps.
    pub plot: Option<PlotId>,
}

// =============================================================================
// BATCH
// =============================================================================

/// A batch as persisted: everything except its edges.
///
/// Edges live in their own append-only relation and are joined back in
/// by the store when a [`Batch`] is read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRecord {
    pub id: BatchId,
    pub weight: Weight,
    pub active: bool,
    pub external_id: Option<String>,
    pub classification: Option<String>,
    pub recipient: Actor,
    pub process_step: ProcessStepId,
}

impl BatchRecord {
    /// Join the record with its edges.
    #[must_use]
    pub fn into_batch(self, ins: BTreeSet<BatchId>, outs: BTreeSet<BatchId>) -> Batch {
        Batch {
            id: self.id,
            weight: self.weight,
            active: self.active,
            external_id: self.external_id,
            classification: self.classification,
            recipient: self.recipient,
            process_step: self.process_step,
            ins,
            outs,
        }
    }
}

/// A quantity of commodity tracked as one node of the provenance DAG.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub id: BatchId,
    pub weight: Weight,
    /// True until the batch is consumed by a later batch.
    pub active: bool,
    pub external_id: Option<String>,
    pub classification: Option<String>,
    pub recipient: Actor,
    pub process_step: ProcessStepId,
    /// Predecessors consumed to produce this batch.
    pub ins: BTreeSet<BatchId>,
    /// Successors derived from this batch.
    pub outs: BTreeSet<BatchId>,
}

impl Batch {
    /// Whether the batch has no predecessors.
    #[must_use]
    pub fn is_origin(&self) -> bool {
        self.ins.is_empty()
    }
}

// =============================================================================
// PLOT OF LAND
// =============================================================================

/// Kind of supporting document attached to a plot.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofKind {
    Ownership,
    FreedomFromDeforestation,
}

/// A supporting document. The document itself lives in external storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    pub kind: ProofKind,
    pub document: String,
}

/// A registered land parcel whose harvests yield origin batches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plot {
    pub id: PlotId,
    pub farmer: IndividualId,
    pub description: String,
    #[serde(default)]
    pub proofs: Vec<Proof>,
}

impl Plot {
    /// Number of proofs attached to the plot.
    #[must_use]
    pub fn proof_count(&self) -> usize {
        self.proofs.len()
    }
}

// =============================================================================
// EDGE
// =============================================================================

/// A directed provenance edge: `from` was consumed to produce `to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub from: BatchId,
    pub to: BatchId,
}

impl Edge {
    #[must_use]
    pub const fn new(from: BatchId, to: BatchId) -> Self {
        Self { from, to }
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Classification of a [`LotgraphError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A referenced record does not exist.
    NotFound,
    /// The request was rejected by a business rule.
    BadRequest,
    /// Storage or encoding failure.
    Internal,
}

/// Errors that can occur in the lotgraph system.
///
/// - Domain rejections (`NotFound`, `BadRequest`) are final: no retries
/// - The CORE never panics; all errors are returned
#[derive(Debug, Error)]
pub enum LotgraphError {
    /// A referenced batch, plot or step does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The request violates a ledger rule.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// A traversal exceeded its bounds.
    #[error("Traversal limit exceeded: {0}")]
    TraversalLimit(String),

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),
}

impl LotgraphError {
    /// Classify the error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::BadRequest(_) | Self::TraversalLimit(_) => ErrorKind::BadRequest,
            Self::SerializationError(_) | Self::IoError(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn batch_not_found(id: BatchId) -> Self {
        Self::NotFound(format!("batch {id}"))
    }

    pub(crate) fn plot_not_found(id: PlotId) -> Self {
        Self::NotFound(format!("plot of land {id}"))
    }
}

// =============================================================================
// TESTS
// =============================================================================
