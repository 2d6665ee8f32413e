//! # Read Service
//!
//! Point lookups with relations expanded, company listings, and the
//! "has all proofs" status of a batch.
//!
//! ## Proof status
//!
//! - a batch whose step names a plot is proven iff that plot carries
//!   exactly [`REQUIRED_PROOF_COUNT`] proofs
//! - otherwise a batch with predecessors is proven iff all of them are
//! - otherwise it is not proven
//!
//! The ancestor cone of all requested batches is fetched layer by layer,
//! then evaluated with an explicit stack and a memo, so shared ancestors
//! are evaluated once.

use crate::ledger::RecordStore;
use crate::primitives::{MAX_RELATED_BATCHES, REQUIRED_PROOF_COUNT};
use crate::query::{BatchFilter, BatchSort};
use crate::{
    Actor, Batch, BatchId, CompanyId, LotgraphError, Plot, PlotId, ProcessStep, ProcessStepId,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A batch with its process step and plot expanded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchDetails {
    pub batch: Batch,
    pub process_step: ProcessStep,
    /// The harvested plot, for origin batches whose plot is registered.
    pub plot: Option<Plot>,
    pub proof_count: Option<usize>,
}

/// One row of a company listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub batch: Batch,
    pub process_step: ProcessStep,
    pub has_all_proofs: bool,
}

fn missing_step(id: ProcessStepId) -> LotgraphError {
    LotgraphError::NotFound(format!("process step {id}"))
}

/// Lookup one batch with its relations.
///
/// # Errors
///
/// `NotFound` if the batch (or its process step) does not exist.
pub fn read_batch_by_id<S: RecordStore + ?Sized>(
    store: &S,
    id: BatchId,
) -> Result<BatchDetails, LotgraphError> {
    let batch = store
        .batch(id)?
        .ok_or_else(|| LotgraphError::batch_not_found(id))?;
    let process_step = store
        .process_step(batch.process_step)?
        .ok_or_else(|| missing_step(batch.process_step))?;
    let plot = match process_step.plot {
        Some(plot_id) => store.plot(plot_id)?,
        None => None,
    };
    let proof_count = plot.as_ref().map(Plot::proof_count);

    Ok(BatchDetails {
        batch,
        process_step,
        plot,
        proof_count,
    })
}

/// List batches held by a company, filtered, sorted and annotated with
/// their proof status.
///
/// # Errors
///
/// `BadRequest` if the filter is malformed.
pub fn read_batches_by_company<S: RecordStore + ?Sized>(
    store: &S,
    company: CompanyId,
    filter: &BatchFilter,
    sort: &BatchSort,
) -> Result<Vec<BatchSummary>, LotgraphError> {
    filter.validate()?;

    let held = store.batches_for_recipient(Actor::Company(company))?;
    let step_ids: BTreeSet<ProcessStepId> = held.iter().map(|b| b.process_step).collect();
    let steps: BTreeMap<ProcessStepId, ProcessStep> = store
        .process_steps(&step_ids)?
        .into_iter()
        .map(|s| (s.id, s))
        .collect();

    let mut rows: Vec<(Batch, ProcessStep)> = Vec::with_capacity(held.len());
    for batch in held {
        let step = steps
            .get(&batch.process_step)
            .cloned()
            .ok_or_else(|| missing_step(batch.process_step))?;
        if filter.matches(&batch, &step) {
            rows.push((batch, step));
        }
    }

    rows.sort_by(|a, b| sort.compare((&a.0, &a.1), (&b.0, &b.1)));

    let status = proof_status(store, rows.iter().map(|(b, _)| b))?;
    Ok(rows
        .into_iter()
        .map(|(batch, process_step)| BatchSummary {
            has_all_proofs: status.get(&batch.id).copied().unwrap_or(false),
            batch,
            process_step,
        })
        .collect())
}

/// Whether a single batch traces back to fully proven plots only.
///
/// # Errors
///
/// `NotFound` if the batch does not exist.
pub fn has_all_proofs<S: RecordStore + ?Sized>(
    store: &S,
    id: BatchId,
) -> Result<bool, LotgraphError> {
    let batch = store
        .batch(id)?
        .ok_or_else(|| LotgraphError::batch_not_found(id))?;
    let status = proof_status(store, std::iter::once(&batch))?;
    Ok(status.get(&id).copied().unwrap_or(false))
}

/// Proof status of `roots` and their whole ancestor cone.
pub fn proof_status<'a, S, I>(
    store: &S,
    roots: I,
) -> Result<BTreeMap<BatchId, bool>, LotgraphError>
where
    S: RecordStore + ?Sized,
    I: IntoIterator<Item = &'a Batch>,
{
    // Ancestor cone, one batched lookup per layer.
    let mut cone: BTreeMap<BatchId, Batch> = roots
        .into_iter()
        .map(|b| (b.id, b.clone()))
        .collect();
    let mut frontier: BTreeSet<BatchId> = cone
        .values()
        .flat_map(|b| b.ins.iter().copied())
        .filter(|id| !cone.contains_key(id))
        .collect();
    while !frontier.is_empty() {
        if cone.len().saturating_add(frontier.len()) > MAX_RELATED_BATCHES {
            return Err(LotgraphError::TraversalLimit(format!(
                "ancestor cone exceeds {MAX_RELATED_BATCHES} batches"
            )));
        }
        let layer = store.batches(&frontier)?;
        frontier = layer
            .iter()
            .flat_map(|b| b.ins.iter().copied())
            .collect();
        for batch in layer {
            cone.insert(batch.id, batch);
        }
        frontier.retain(|id| !cone.contains_key(id));
    }

    let step_ids: BTreeSet<ProcessStepId> = cone.values().map(|b| b.process_step).collect();
    let step_plots: BTreeMap<ProcessStepId, PlotId> = store
        .process_steps(&step_ids)?
        .into_iter()
        .filter_map(|s| s.plot.map(|plot| (s.id, plot)))
        .collect();
    let plot_ids: BTreeSet<PlotId> = step_plots.values().copied().collect();
    let counts = store.proof_counts(&plot_ids)?;

    // Post-order evaluation: (id, predecessors already pushed).
    let mut memo: BTreeMap<BatchId, bool> = BTreeMap::new();
    let mut pending: BTreeSet<BatchId> = BTreeSet::new();
    let mut stack: Vec<(BatchId, bool)> = cone.keys().map(|id| (*id, false)).collect();
    while let Some((id, expanded)) = stack.pop() {
        if memo.contains_key(&id) {
            continue;
        }
        let Some(batch) = cone.get(&id) else {
            memo.insert(id, false);
            continue;
        };
        if expanded {
            let proven = batch
                .ins
                .iter()
                .all(|p| memo.get(p).copied().unwrap_or(false));
            memo.insert(id, proven);
            pending.remove(&id);
            continue;
        }
        if let Some(plot) = step_plots.get(&batch.process_step) {
            let count = counts.get(plot).copied().unwrap_or(0);
            memo.insert(id, count == REQUIRED_PROOF_COUNT);
            continue;
        }
        if batch.ins.is_empty() {
            memo.insert(id, false);
            continue;
        }
        // A batch already on the stack is part of a cycle; stop there.
        if !pending.insert(id) {
            continue;
        }
        stack.push((id, true));
        stack.extend(
            batch
                .ins
                .iter()
                .filter(|p| !memo.contains_key(*p))
                .map(|p| (*p, false)),
        );
    }
    Ok(memo)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::creation::{CreationEngine, CreationOutcome};
    use crate::ledger::{Ledger, PlotRegistry};
    use crate::{BatchCreateRequest, IndividualId, ProcessStepInput, Proof, ProofKind, Weight};
    use chrono::{DateTime, Utc};

    const FARMER: IndividualId = IndividualId(1);
    const MILL: CompanyId = CompanyId(10);

    fn plot(id: u64, proofs: usize) -> Plot {
        let kinds = [ProofKind::Ownership, ProofKind::FreedomFromDeforestation];
        Plot {
            id: PlotId(id),
            farmer: FARMER,
            description: String::new(),
            proofs: (0..proofs)
                .map(|i| Proof {
                    kind: kinds[i % 2].clone(),
                    document: format!("doc-{i}"),
                })
                .collect(),
        }
    }

    fn input(plot: Option<u64>, process: &str) -> ProcessStepInput {
        ProcessStepInput {
            location: "Hill".to_string(),
            date_of_process: DateTime::<Utc>::UNIX_EPOCH,
            process: process.to_string(),
            executed_by: Actor::Individual(FARMER),
            recorded_by: Actor::Individual(FARMER),
            plot: plot.map(PlotId),
        }
    }

    fn request(plot: Option<u64>, ins: &[BatchId], process: &str) -> BatchCreateRequest {
        BatchCreateRequest {
            weight: Weight(10),
            ins: ins.to_vec(),
            external_id: None,
            classification: None,
            recipient: Actor::Company(MILL),
            process_step: input(plot, process),
        }
    }

    fn created(outcome: CreationOutcome) -> Vec<BatchId> {
        match outcome {
            CreationOutcome::Created(r) => r.created,
            CreationOutcome::NoContent => Vec::new(),
        }
    }

    /// Harvests on a proven and an unproven plot, each roasted once.
    fn ledger() -> (Ledger, BatchId, BatchId) {
        let mut ledger = Ledger::new();
        ledger.upsert_plot(plot(1, 2)).expect("upsert");
        ledger.upsert_plot(plot(2, 1)).expect("upsert");
        let now = DateTime::<Utc>::UNIX_EPOCH;

        let good = created(
            CreationEngine::create_harvests(&mut ledger, &[request(Some(1), &[], "")], now)
                .expect("harvest"),
        );
        let bad = created(
            CreationEngine::create_harvests(&mut ledger, &[request(Some(2), &[], "")], now)
                .expect("harvest"),
        );
        let roasted_good = created(
            CreationEngine::create_batches(&mut ledger, &[request(None, &good, "Roasting")], now)
                .expect("roast"),
        );
        let roasted_bad = created(
            CreationEngine::create_batches(&mut ledger, &[request(None, &bad, "Roasting")], now)
                .expect("roast"),
        );
        (ledger, roasted_good[0], roasted_bad[0])
    }

    #[test]
    fn status_follows_predecessors() {
        let (ledger, good, bad) = ledger();
        assert!(has_all_proofs(&ledger, good).expect("status"));
        assert!(!has_all_proofs(&ledger, bad).expect("status"));
    }

    #[test]
    fn blend_of_proven_and_unproven_is_unproven() {
        let (mut ledger, good, bad) = ledger();
        let blend = created(
            CreationEngine::create_batches(
                &mut ledger,
                &[request(None, &[good, bad], "Blending")],
                DateTime::<Utc>::UNIX_EPOCH,
            )
            .expect("blend"),
        );
        assert!(!has_all_proofs(&ledger, blend[0]).expect("status"));
    }

    #[test]
    fn batch_without_plot_or_predecessors_is_unproven() {
        let mut ledger = Ledger::new();
        let orphan = created(
            CreationEngine::create_batches(
                &mut ledger,
                &[request(None, &[], "Sorting")],
                DateTime::<Utc>::UNIX_EPOCH,
            )
            .expect("create"),
        );
        assert!(!has_all_proofs(&ledger, orphan[0]).expect("status"));
    }

    #[test]
    fn more_than_two_proofs_is_unproven() {
        let mut ledger = Ledger::new();
        ledger.upsert_plot(plot(3, 3)).expect("upsert");
        let harvest = created(
            CreationEngine::create_harvests(
                &mut ledger,
                &[request(Some(3), &[], "")],
                DateTime::<Utc>::UNIX_EPOCH,
            )
            .expect("harvest"),
        );
        assert!(!has_all_proofs(&ledger, harvest[0]).expect("status"));
    }

    #[test]
    fn details_expand_plot_of_harvest() {
        let (ledger, _, _) = ledger();
        let details = read_batch_by_id(&ledger, BatchId(0)).expect("read");
        assert_eq!(details.process_step.plot, Some(PlotId(1)));
        assert_eq!(details.proof_count, Some(2));
        assert!(!details.batch.active);
    }

    #[test]
    fn unknown_batch_is_not_found() {
        let ledger = Ledger::new();
        assert!(matches!(
            read_batch_by_id(&ledger, BatchId(3)),
            Err(LotgraphError::NotFound(_))
        ));
    }

    #[test]
    fn company_listing_filters_and_annotates() {
        let (ledger, good, bad) = ledger();
        let filter = BatchFilter {
            active: Some(true),
            ..BatchFilter::default()
        };
        let rows =
            read_batches_by_company(&ledger, MILL, &filter, &BatchSort::default()).expect("list");
        let ids: Vec<BatchId> = rows.iter().map(|r| r.batch.id).collect();
        assert_eq!(ids, vec![good, bad]);
        assert!(rows[0].has_all_proofs);
        assert!(!rows[1].has_all_proofs);

        let other = read_batches_by_company(
            &ledger,
            CompanyId(99),
            &BatchFilter::default(),
            &BatchSort::default(),
        )
        .expect("list");
        assert!(other.is_empty());
    }
}
