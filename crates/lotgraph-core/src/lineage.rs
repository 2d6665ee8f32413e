//! # Lineage Traversal
//!
//! Discovers the connected provenance subgraph around a seed batch and
//! propagates the "invalid" taint downstream from unverified harvests.
//!
//! Discovery walks `ins` and `outs` in both directions, one batched store
//! lookup per layer, so the returned batches and edges are the whole
//! weakly-connected component: any seed inside the component yields the
//! same result.
//!
//! Invalidity is computed at read time and never stored. A batch is
//! directly invalid when its process step names a plot whose proof count
//! is not [`REQUIRED_PROOF_COUNT`]; every edge leaving a batch reachable
//! downstream of a directly invalid batch is invalid.

use crate::ledger::RecordStore;
use crate::primitives::{MAX_RELATED_BATCHES, REQUIRED_PROOF_COUNT};
use crate::{Batch, BatchId, Edge, LotgraphError, PlotId, ProcessStepId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A provenance edge annotated with the invalid taint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LineageEdge {
    pub from: BatchId,
    pub to: BatchId,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub invalid: bool,
}

impl LineageEdge {
    #[must_use]
    pub fn edge(&self) -> Edge {
        Edge::new(self.from, self.to)
    }
}

/// The component around a seed batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedBatches {
    /// Every batch of the component, ordered by id.
    pub batches: Vec<Batch>,
    /// Every edge of the component, ordered by `(from, to)`.
    pub edges: Vec<LineageEdge>,
}

impl RelatedBatches {
    /// Edges carrying the invalid taint.
    pub fn invalid_edges(&self) -> impl Iterator<Item = &LineageEdge> {
        self.edges.iter().filter(|e| e.invalid)
    }
}

/// Discover the component around `seed` and mark its invalid edges.
///
/// # Errors
///
/// - `NotFound` if `seed` does not exist
/// - `TraversalLimit` if the component exceeds [`MAX_RELATED_BATCHES`]
pub fn read_related_batches<S: RecordStore + ?Sized>(
    store: &S,
    seed: BatchId,
) -> Result<RelatedBatches, LotgraphError> {
    let (batches, edges) = discover_component(store, seed)?;
    let sources = directly_invalid(store, &batches)?;
    let tainted = propagate_invalidity(&sources, &edges);

    Ok(RelatedBatches {
        edges: edges
            .into_iter()
            .map(|e| LineageEdge {
                from: e.from,
                to: e.to,
                invalid: tainted.contains(&e.from),
            })
            .collect(),
        batches: batches.into_values().collect(),
    })
}

/// Layered BFS over `ins` and `outs`.
fn discover_component<S: RecordStore + ?Sized>(
    store: &S,
    seed: BatchId,
) -> Result<(BTreeMap<BatchId, Batch>, BTreeSet<Edge>), LotgraphError> {
    let Some(seed_batch) = store.batch(seed)? else {
        return Err(LotgraphError::batch_not_found(seed));
    };

    let mut visited: BTreeMap<BatchId, Batch> = BTreeMap::new();
    let mut edges: BTreeSet<Edge> = BTreeSet::new();
    let mut layer = vec![seed_batch];

    loop {
        let mut frontier = BTreeSet::new();
        for batch in &layer {
            for &parent in &batch.ins {
                edges.insert(Edge::new(parent, batch.id));
                frontier.insert(parent);
            }
            for &child in &batch.outs {
                edges.insert(Edge::new(batch.id, child));
                frontier.insert(child);
            }
        }
        for batch in layer {
            visited.insert(batch.id, batch);
        }
        frontier.retain(|id| !visited.contains_key(id));

        if frontier.is_empty() {
            break;
        }
        if visited.len().saturating_add(frontier.len()) > MAX_RELATED_BATCHES {
            return Err(LotgraphError::TraversalLimit(format!(
                "lineage of batch {seed} exceeds {MAX_RELATED_BATCHES} batches"
            )));
        }
        layer = store.batches(&frontier)?;
    }

    Ok((visited, edges))
}

/// Batches whose own harvest plot is not fully proven.
fn directly_invalid<S: RecordStore + ?Sized>(
    store: &S,
    batches: &BTreeMap<BatchId, Batch>,
) -> Result<BTreeSet<BatchId>, LotgraphError> {
    let step_ids: BTreeSet<ProcessStepId> = batches.values().map(|b| b.process_step).collect();
    let step_plots: BTreeMap<ProcessStepId, PlotId> = store
        .process_steps(&step_ids)?
        .into_iter()
        .filter_map(|s| s.plot.map(|plot| (s.id, plot)))
        .collect();

    let plot_ids: BTreeSet<PlotId> = step_plots.values().copied().collect();
    let counts = store.proof_counts(&plot_ids)?;

    Ok(batches
        .values()
        .filter(|b| {
            step_plots.get(&b.process_step).is_some_and(|plot| {
                // An unregistered plot carries no proofs.
                counts.get(plot).copied().unwrap_or(0) != REQUIRED_PROOF_COUNT
            })
        })
        .map(|b| b.id)
        .collect())
}

/// Every batch reachable downstream of `sources` (sources included).
///
/// Explicit-stack DFS over the forward adjacency of `edges`; each batch is
/// expanded at most once, so the walk terminates on any input.
#[must_use]
pub fn propagate_invalidity(
    sources: &BTreeSet<BatchId>,
    edges: &BTreeSet<Edge>,
) -> BTreeSet<BatchId> {
    let mut forward: BTreeMap<BatchId, Vec<BatchId>> = BTreeMap::new();
    for edge in edges {
        forward.entry(edge.from).or_default().push(edge.to);
    }

    let mut tainted = BTreeSet::new();
    let mut stack: Vec<BatchId> = sources.iter().copied().collect();
    while let Some(current) = stack.pop() {
        if !tainted.insert(current) {
            continue;
        }
        if let Some(children) = forward.get(&current) {
            stack.extend(children.iter().filter(|c| !tainted.contains(*c)));
        }
    }
    tainted
}

// =============================================================================
// TESTS
// =============================================================================
