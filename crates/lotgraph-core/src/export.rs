//! # Audit Export Module
//!
//! Reconstructs a nested tree rooted at one batch from the provenance DAG:
//! the root's ancestors nested under `ins`, its descendants nested under
//! `outs`. Ancestor nodes only expose further `ins`, descendant nodes only
//! further `outs`.
//!
//! The export is a tree, not a graph: a batch reachable along two paths
//! (a diamond) is rendered twice, once under each parent.
//!
//! Each direction is built layer by layer (one batched lookup per layer)
//! into an arena, then assembled bottom-up without recursion. Depth and
//! total size are bounded by [`MAX_EXPORT_DEPTH`] and [`MAX_EXPORT_NODES`].
//!
//! With the `crypto-hash` feature the snapshot carries a BLAKE3 digest of
//! the canonical `postcard` encoding of the tree.

use crate::ledger::RecordStore;
use crate::primitives::{MAX_EXPORT_DEPTH, MAX_EXPORT_NODES};
use crate::{Batch, BatchId, BatchRecord, LotgraphError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// EXPORT FORMAT
// =============================================================================

/// One batch of the export tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    pub batch: BatchRecord,
    /// Nested ancestors. Empty for descendant nodes.
    pub ins: Vec<TreeNode>,
    /// Nested descendants. Empty for ancestor nodes.
    pub outs: Vec<TreeNode>,
}

impl TreeNode {
    fn leaf(batch: BatchRecord) -> Self {
        Self {
            batch,
            ins: Vec::new(),
            outs: Vec::new(),
        }
    }

    /// Number of nodes in this subtree, duplicates included.
    #[must_use]
    pub fn node_count(&self) -> usize {
        let mut count = 0usize;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            count = count.saturating_add(1);
            stack.extend(node.ins.iter());
            stack.extend(node.outs.iter());
        }
        count
    }

    /// Every occurrence of `id` in this subtree.
    #[must_use]
    pub fn occurrences(&self, id: BatchId) -> usize {
        let mut count = 0usize;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if node.batch.id == id {
                count = count.saturating_add(1);
            }
            stack.extend(node.ins.iter());
            stack.extend(node.outs.iter());
        }
        count
    }
}

/// The audit export envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportSnapshot {
    pub request_date: DateTime<Utc>,
    pub root_batch: TreeNode,
    /// Hex BLAKE3 digest of the postcard-encoded `root_batch`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

impl ExportSnapshot {
    /// Recompute the digest and compare it with the stored one.
    ///
    /// Snapshots without a digest verify as `false`.
    #[cfg(feature = "crypto-hash")]
    pub fn verify_digest(&self) -> Result<bool, LotgraphError> {
        match &self.digest {
            Some(stored) => Ok(*stored == tree_digest(&self.root_batch)?),
            None => Ok(false),
        }
    }
}

#[cfg(feature = "crypto-hash")]
fn tree_digest(tree: &TreeNode) -> Result<String, LotgraphError> {
    let bytes = postcard::to_allocvec(tree)
        .map_err(|e| LotgraphError::SerializationError(e.to_string()))?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

// =============================================================================
// TREE BUILDER
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Ancestors,
    Descendants,
}

impl Direction {
    fn raw(self, batch: &Batch) -> &BTreeSet<BatchId> {
        match self {
            Self::Ancestors => &batch.ins,
            Self::Descendants => &batch.outs,
        }
    }
}

struct ArenaNode {
    record: BatchRecord,
    raw: BTreeSet<BatchId>,
    children: Vec<usize>,
}

fn split(batch: Batch, direction: Direction) -> (BatchRecord, BTreeSet<BatchId>) {
    let raw = direction.raw(&batch).clone();
    let record = BatchRecord {
        id: batch.id,
        weight: batch.weight,
        active: batch.active,
        external_id: batch.external_id,
        classification: batch.classification,
        recipient: batch.recipient,
        process_step: batch.process_step,
    };
    (record, raw)
}

/// Expand one direction from `root` and return the root's children.
///
/// `budget` is the number of nodes still allowed across the whole export.
fn expand<S: RecordStore + ?Sized>(
    store: &S,
    root: &Batch,
    direction: Direction,
    budget: &mut usize,
) -> Result<Vec<TreeNode>, LotgraphError> {
    let (root_record, root_raw) = split(root.clone(), direction);
    let mut arena = vec![ArenaNode {
        record: root_record,
        raw: root_raw,
        children: Vec::new(),
    }];
    let mut previous: Vec<usize> = vec![0];
    let mut frontier: BTreeSet<BatchId> = arena[0].raw.clone();
    let mut depth = 0usize;

    while !frontier.is_empty() {
        depth = depth.saturating_add(1);
        if depth > MAX_EXPORT_DEPTH {
            return Err(LotgraphError::TraversalLimit(format!(
                "export of batch {} exceeds depth {MAX_EXPORT_DEPTH}",
                root.id
            )));
        }

        let fetched: BTreeMap<BatchId, Batch> = store
            .batches(&frontier)?
            .into_iter()
            .map(|b| (b.id, b))
            .collect();

        let mut layer = Vec::new();
        for parent in previous {
            let wanted: Vec<BatchId> = arena[parent].raw.iter().copied().collect();
            for id in wanted {
                let Some(batch) = fetched.get(&id) else {
                    continue;
                };
                *budget = budget.checked_sub(1).ok_or_else(|| {
                    LotgraphError::TraversalLimit(format!(
                        "export of batch {} exceeds {MAX_EXPORT_NODES} nodes",
                        root.id
                    ))
                })?;
                let (record, raw) = split(batch.clone(), direction);
                let index = arena.len();
                arena.push(ArenaNode {
                    record,
                    raw,
                    children: Vec::new(),
                });
                arena[parent].children.push(index);
                layer.push(index);
            }
        }

        frontier = layer
            .iter()
            .flat_map(|i| arena[*i].raw.iter().copied())
            .collect();
        previous = layer;
    }

    // Children always sit at higher indices than their parent.
    let mut built: Vec<Option<TreeNode>> = Vec::with_capacity(arena.len());
    built.resize_with(arena.len(), || None);
    while let Some(node) = arena.pop() {
        let index = arena.len();
        let children: Vec<TreeNode> = node
            .children
            .iter()
            .filter_map(|c| built.get_mut(*c).and_then(Option::take))
            .collect();
        if index == 0 {
            return Ok(children);
        }
        let mut tree = TreeNode::leaf(node.record);
        match direction {
            Direction::Ancestors => tree.ins = children,
            Direction::Descendants => tree.outs = children,
        }
        built[index] = Some(tree);
    }
    Ok(Vec::new())
}

/// Build the audit export tree rooted at `root`.
///
/// # Errors
///
/// - `NotFound` if `root` does not exist
/// - `TraversalLimit` if either direction is deeper than
///   [`MAX_EXPORT_DEPTH`] or the tree exceeds [`MAX_EXPORT_NODES`]
pub fn export_batch<S: RecordStore + ?Sized>(
    store: &S,
    root: BatchId,
    request_date: DateTime<Utc>,
) -> Result<ExportSnapshot, LotgraphError> {
    let Some(batch) = store.batch(root)? else {
        return Err(LotgraphError::batch_not_found(root));
    };

    let mut budget = MAX_EXPORT_NODES.saturating_sub(1);
    let ins = expand(store, &batch, Direction::Ancestors, &mut budget)?;
    let outs = expand(store, &batch, Direction::Descendants, &mut budget)?;

    let (record, _) = split(batch, Direction::Ancestors);
    let root_batch = TreeNode {
        batch: record,
        ins,
        outs,
    };

    #[cfg(feature = "crypto-hash")]
    let digest = Some(tree_digest(&root_batch)?);
    #[cfg(not(feature = "crypto-hash"))]
    let digest = None;

    Ok(ExportSnapshot {
        request_date,
        root_batch,
        digest,
    })
}

// =============================================================================
// TESTS
// =============================================================================
