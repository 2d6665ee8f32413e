//! # Batch Creation Engine
//!
//! The only writer of the ledger. Three operations create batches:
//!
//! - [`CreationEngine::create_harvests`]: origin batches, one per request,
//!   merged into a single batch when several lots arrive together
//! - [`CreationEngine::create_combined_harvests`]: one farmer's harvest over
//!   several plots under one process step, weight split evenly, then merged
//! - [`CreationEngine::create_batches`]: generic transform/split steps that
//!   consume active predecessors
//!
//! Every call validates all of its input before staging anything, stages
//! the whole call into one [`LedgerWrite`] and commits it at once. A
//! rejected call leaves the ledger untouched.
//!
//! Notarization is not performed here: each receipt carries the
//! [`MintRequest`]s for the caller to dispatch after the commit.

use crate::ledger::{LedgerWrite, RecordStore};
use crate::primitives::{
    HARVEST_PROCESS, MAX_PLOTS_PER_COMBINED_HARVEST, MAX_REQUESTS_PER_CALL, MERGE_PROCESS,
};
use crate::{
    Actor, BatchCreateRequest, BatchId, BatchRecord, CombinedHarvestRequest, LotgraphError,
    PlotId, ProcessStepId, ProcessStepInput, Weight,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// =============================================================================
// OUTCOMES
// =============================================================================

/// A notarization request for one newly created batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MintRequest {
    /// The batch has no predecessors.
    Root {
        batch: BatchId,
        plot: Option<PlotId>,
    },
    /// The batch was derived from `parents`.
    Leaf {
        batch: BatchId,
        parents: Vec<BatchId>,
    },
}

impl MintRequest {
    /// The batch being notarized.
    #[must_use]
    pub fn batch(&self) -> BatchId {
        match self {
            Self::Root { batch, .. } | Self::Leaf { batch, .. } => *batch,
        }
    }
}

/// What a successful creation call committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreationReceipt {
    /// The governing process step: the merge's if one happened.
    pub process_step_id: ProcessStepId,
    /// Every batch created by the call, in creation order.
    pub created: Vec<BatchId>,
    /// Notarization requests, in creation order.
    pub mints: Vec<MintRequest>,
}

/// Result of a creation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreationOutcome {
    /// The request list was empty; nothing was done.
    NoContent,
    Created(CreationReceipt),
}

impl CreationOutcome {
    /// The governing process step id, if anything was created.
    #[must_use]
    pub fn process_step_id(&self) -> Option<ProcessStepId> {
        match self {
            Self::NoContent => None,
            Self::Created(receipt) => Some(receipt.process_step_id),
        }
    }
}

// =============================================================================
// HARVEST STAGING
// =============================================================================

/// One origin lot of a harvest event.
struct HarvestLot<'a> {
    weight: Weight,
    plot: PlotId,
    recipient: Actor,
    external_id: Option<&'a str>,
    classification: Option<&'a str>,
    step: &'a ProcessStepInput,
}

/// Stage a harvest event: one origin batch per lot, then a merge when
/// there is more than one lot.
fn stage_harvest_event(
    write: &mut LedgerWrite,
    lots: &[HarvestLot<'_>],
    recorded_at: DateTime<Utc>,
) -> CreationReceipt {
    let mut created = Vec::with_capacity(lots.len() + 1);
    let mut mints = Vec::with_capacity(lots.len() + 1);
    let mut governing = None;

    for lot in lots {
        let step_id = write.allocate_step();
        write.push_step(
            lot.step
                .to_step(step_id, Some(HARVEST_PROCESS), Some(lot.plot), recorded_at),
        );
        let batch_id = write.allocate_batch();
        write.push_batch(
            BatchRecord {
                id: batch_id,
                weight: lot.weight,
                active: true,
                external_id: lot.external_id.map(str::to_string),
                classification: lot.classification.map(str::to_string),
                recipient: lot.recipient,
                process_step: step_id,
            },
            BTreeSet::new(),
        );
        created.push(batch_id);
        mints.push(MintRequest::Root {
            batch: batch_id,
            plot: Some(lot.plot),
        });
        governing = Some(step_id);
    }

    if let [first, _, ..] = lots {
        let harvested: Vec<BatchId> = created.clone();
        let step_id = write.allocate_step();
        write.push_step(first.step.to_step(step_id, Some(MERGE_PROCESS), None, recorded_at));
        let merge_id = write.allocate_batch();
        write.push_batch(
            BatchRecord {
                id: merge_id,
                weight: Weight::sum(lots.iter().map(|l| l.weight)),
                active: true,
                external_id: first.external_id.map(str::to_string),
                classification: first.classification.map(str::to_string),
                recipient: first.recipient,
                process_step: step_id,
            },
            harvested.iter().copied().collect(),
        );
        for id in &harvested {
            write.deactivate(*id);
        }
        created.push(merge_id);
        mints.push(MintRequest::Leaf {
            batch: merge_id,
            parents: harvested,
        });
        governing = Some(step_id);
    }

    CreationReceipt {
        // Callers never stage an empty event.
        process_step_id: governing.unwrap_or(ProcessStepId(write.base().next_step)),
        created,
        mints,
    }
}

/// Lots merged in one call must agree on who holds and who recorded them.
fn check_merge_consistency<'a, I>(mut lots: I) -> Result<(), LotgraphError>
where
    I: Iterator<Item = (Actor, &'a ProcessStepInput)>,
{
    let Some((recipient, step)) = lots.next() else {
        return Ok(());
    };
    for (other_recipient, other_step) in lots {
        if other_recipient != recipient {
            return Err(LotgraphError::BadRequest(format!(
                "merged harvests disagree on recipient ({recipient} vs {other_recipient})"
            )));
        }
        if other_step.executed_by != step.executed_by || other_step.recorded_by != step.recorded_by
        {
            return Err(LotgraphError::BadRequest(
                "merged harvests disagree on executing or recording actor".to_string(),
            ));
        }
    }
    Ok(())
}

fn check_call_size(len: usize) -> Result<(), LotgraphError> {
    if len > MAX_REQUESTS_PER_CALL {
        return Err(LotgraphError::BadRequest(format!(
            "{len} requests exceeds maximum {MAX_REQUESTS_PER_CALL}"
        )));
    }
    Ok(())
}

// =============================================================================
// CREATION ENGINE
// =============================================================================

/// The CreationEngine validates and commits new batches.
pub struct CreationEngine;

impl CreationEngine {
    /// Create origin batches, one per request.
    ///
    /// With more than one request the lots are treated as parallel parts
    /// of one harvest: a Merge batch consuming all of them is created and
    /// its process step is returned.
    ///
    /// # Errors
    ///
    /// - `BadRequest` if a request has predecessors, no plot, zero weight,
    ///   or the merged lots disagree on recipient or actors
    /// - `NotFound` if a referenced plot does not exist
    pub fn create_harvests<S: RecordStore + ?Sized>(
        store: &mut S,
        requests: &[BatchCreateRequest],
        recorded_at: DateTime<Utc>,
    ) -> Result<CreationOutcome, LotgraphError> {
        if requests.is_empty() {
            return Ok(CreationOutcome::NoContent);
        }
        check_call_size(requests.len())?;

        let mut plots = Vec::with_capacity(requests.len());
        for request in requests {
            request.validate()?;
            if !request.ins.is_empty() {
                return Err(LotgraphError::BadRequest(
                    "harvest batches cannot have predecessors".to_string(),
                ));
            }
            let Some(plot) = request.process_step.plot else {
                return Err(LotgraphError::BadRequest(
                    "harvest requires a plot of land".to_string(),
                ));
            };
            plots.push(plot);
        }

        let wanted: BTreeSet<PlotId> = plots.iter().copied().collect();
        let known: BTreeSet<PlotId> = store.plots(&wanted)?.into_iter().map(|p| p.id).collect();
        if let Some(missing) = wanted.difference(&known).next() {
            return Err(LotgraphError::plot_not_found(*missing));
        }

        check_merge_consistency(requests.iter().map(|r| (r.recipient, &r.process_step)))?;

        let lots: Vec<HarvestLot<'_>> = requests
            .iter()
            .zip(plots)
            .map(|(request, plot)| HarvestLot {
                weight: request.weight,
                plot,
                recipient: request.recipient,
                external_id: request.external_id.as_deref(),
                classification: request.classification.as_deref(),
                step: &request.process_step,
            })
            .collect();

        let mut write = LedgerWrite::new(store.watermark()?);
        let receipt = stage_harvest_event(&mut write, &lots, recorded_at);
        store.commit(write)?;
        Ok(CreationOutcome::Created(receipt))
    }

    /// Harvest several plots of one farmer as a single harvest event.
    ///
    /// The total weight is split evenly across the plots (the remainder
    /// goes to the first plots, one unit each); one origin batch is created
    /// per plot and merged when there is more than one.
    ///
    /// # Errors
    ///
    /// - `NotFound` if any plot does not exist
    /// - `BadRequest` if any plot belongs to a different farmer than the
    ///   executing actor, a plot is listed twice, or the weight does not
    ///   cover every plot
    pub fn create_combined_harvests<S: RecordStore + ?Sized>(
        store: &mut S,
        request: &CombinedHarvestRequest,
        recorded_at: DateTime<Utc>,
    ) -> Result<CreationOutcome, LotgraphError> {
        request.validate()?;
        if request.plots.len() > MAX_PLOTS_PER_COMBINED_HARVEST {
            return Err(LotgraphError::BadRequest(format!(
                "{} plots exceeds maximum {MAX_PLOTS_PER_COMBINED_HARVEST}",
                request.plots.len()
            )));
        }

        let wanted: BTreeSet<PlotId> = request.plots.iter().copied().collect();
        if wanted.len() != request.plots.len() {
            return Err(LotgraphError::BadRequest(
                "a plot is listed more than once".to_string(),
            ));
        }

        let found = store.plots(&wanted)?;
        if let Some(missing) = wanted
            .iter()
            .find(|id| !found.iter().any(|p| p.id == **id))
        {
            return Err(LotgraphError::plot_not_found(*missing));
        }
        if !wanted.is_empty() {
            let farmer = request.process_step.executed_by.individual();
            if let Some(foreign) = found.iter().find(|p| Some(p.farmer) != farmer) {
                return Err(LotgraphError::BadRequest(format!(
                    "plot {} does not belong to the executing farmer",
                    foreign.id
                )));
            }
        }

        let shares = request.weight.split_evenly(request.plots.len());
        if shares.is_empty() {
            return Ok(CreationOutcome::NoContent);
        }
        if shares.iter().any(|w| w.value() == 0) {
            return Err(LotgraphError::BadRequest(format!(
                "weight {} cannot be divided across {} plots",
                request.weight,
                request.plots.len()
            )));
        }

        let lots: Vec<HarvestLot<'_>> = request
            .plots
            .iter()
            .zip(shares)
            .map(|(plot, weight)| HarvestLot {
                weight,
                plot: *plot,
                recipient: request.recipient,
                external_id: request.external_id.as_deref(),
                classification: request.classification.as_deref(),
                step: &request.process_step,
            })
            .collect();

        let mut write = LedgerWrite::new(store.watermark()?);
        let receipt = stage_harvest_event(&mut write, &lots, recorded_at);
        store.commit(write)?;
        Ok(CreationOutcome::Created(receipt))
    }

    /// Create batches derived from existing active batches.
    ///
    /// All requests share one process step, taken from the first request.
    /// Every predecessor of every request is validated before anything is
    /// staged; each request's predecessors are deactivated after its batch
    /// is created. Several requests may consume the same predecessor (a
    /// split).
    ///
    /// # Errors
    ///
    /// - `NotFound` if any predecessor does not exist
    /// - `BadRequest` if any predecessor is already inactive, the shared
    ///   step names a plot or has no process name, or a request is invalid
    pub fn create_batches<S: RecordStore + ?Sized>(
        store: &mut S,
        requests: &[BatchCreateRequest],
        recorded_at: DateTime<Utc>,
    ) -> Result<CreationOutcome, LotgraphError> {
        let Some(first) = requests.first() else {
            return Ok(CreationOutcome::NoContent);
        };
        check_call_size(requests.len())?;
        for request in requests {
            request.validate()?;
        }

        let shared = &first.process_step;
        if shared.process.trim().is_empty() {
            return Err(LotgraphError::BadRequest(
                "process name is required".to_string(),
            ));
        }
        if shared.plot.is_some() {
            return Err(LotgraphError::BadRequest(
                "only harvest steps reference a plot of land".to_string(),
            ));
        }

        // First pass: every predecessor, in request order. The first
        // failing reference decides the error.
        let predecessors: BTreeSet<BatchId> = requests
            .iter()
            .flat_map(|r| r.ins.iter().copied())
            .collect();
        let found = store.batches(&predecessors)?;
        for id in requests.iter().flat_map(|r| r.ins.iter()) {
            match found.iter().find(|b| b.id == *id) {
                None => return Err(LotgraphError::batch_not_found(*id)),
                Some(batch) if !batch.active => {
                    return Err(LotgraphError::BadRequest(format!(
                        "batch {id} is already inactive"
                    )));
                }
                Some(_) => {}
            }
        }

        let mut write = LedgerWrite::new(store.watermark()?);
        let step_id = write.allocate_step();
        write.push_step(shared.to_step(step_id, None, None, recorded_at));

        let mut created = Vec::with_capacity(requests.len());
        let mut mints = Vec::with_capacity(requests.len());
        for request in requests {
            let ins: BTreeSet<BatchId> = request.ins.iter().copied().collect();
            let batch_id = write.allocate_batch();
            write.push_batch(
                BatchRecord {
                    id: batch_id,
                    weight: request.weight,
                    active: true,
                    external_id: request.external_id.clone(),
                    classification: request.classification.clone(),
                    recipient: request.recipient,
                    process_step: step_id,
                },
                ins.clone(),
            );
            for parent in &ins {
                write.deactivate(*parent);
            }
            created.push(batch_id);
            mints.push(if ins.is_empty() {
                MintRequest::Root {
                    batch: batch_id,
                    plot: None,
                }
            } else {
                MintRequest::Leaf {
                    batch: batch_id,
                    parents: ins.into_iter().collect(),
                }
            });
        }

        store.commit(write)?;
        Ok(CreationOutcome::Created(CreationReceipt {
            process_step_id: step_id,
            created,
            mints,
        }))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::ledger::{Ledger, PlotRegistry};
    use crate::{CompanyId, IndividualId, Plot};

    const FARMER: IndividualId = IndividualId(7);
    const BUYER: CompanyId = CompanyId(3);

    fn now() -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH
    }

    fn ledger_with_plots(owners: &[(u64, IndividualId)]) -> Ledger {
        let mut ledger = Ledger::new();
        for (id, farmer) in owners {
            ledger
                .upsert_plot(Plot {
                    id: PlotId(*id),
                    farmer: *farmer,
                    description: format!("plot {id}"),
                    proofs: vec![],
                })
                .expect("upsert");
        }
        ledger
    }

    fn step(plot: Option<u64>, process: &str) -> ProcessStepInput {
        ProcessStepInput {
            location: String::new(),
            date_of_process: now(),
            process: process.to_string(),
            executed_by: Actor::Individual(FARMER),
            recorded_by: Actor::Individual(FARMER),
            plot: plot.map(PlotId),
        }
    }

    fn harvest(plot: u64, weight: u64) -> BatchCreateRequest {
        BatchCreateRequest {
            weight: Weight(weight),
            ins: vec![],
            external_id: None,
            classification: Some("0901".to_string()),
            recipient: Actor::Company(BUYER),
            process_step: step(Some(plot), ""),
        }
    }

    fn derived(ins: &[BatchId], weight: u64) -> BatchCreateRequest {
        BatchCreateRequest {
            weight: Weight(weight),
            ins: ins.to_vec(),
            external_id: None,
            classification: None,
            recipient: Actor::Company(BUYER),
            process_step: step(None, "Roasting"),
        }
    }

    fn receipt(outcome: CreationOutcome) -> CreationReceipt {
        match outcome {
            CreationOutcome::Created(r) => r,
            CreationOutcome::NoContent => panic!("expected a receipt"),
        }
    }

    #[test]
    fn single_harvest_is_not_merged() {
        let mut ledger = ledger_with_plots(&[(1, FARMER)]);
        let r = receipt(
            CreationEngine::create_harvests(&mut ledger, &[harvest(1, 40)], now()).expect("create"),
        );
        assert_eq!(r.created.len(), 1);
        let batch = ledger.batch(r.created[0]).expect("read").expect("exists");
        assert!(batch.active);
        assert!(batch.is_origin());
        assert_eq!(batch.process_step, r.process_step_id);
        let step = ledger
            .process_step(r.process_step_id)
            .expect("read")
            .expect("exists");
        assert_eq!(step.process, HARVEST_PROCESS);
        assert_eq!(step.plot, Some(PlotId(1)));
        assert_eq!(step.location, crate::primitives::DEFAULT_LOCATION);
        assert_eq!(
            r.mints,
            vec![MintRequest::Root {
                batch: r.created[0],
                plot: Some(PlotId(1))
            }]
        );
    }

    #[test]
    fn two_harvests_of_33_merge_into_66() {
        let mut ledger = ledger_with_plots(&[(1, FARMER)]);
        let r = receipt(
            CreationEngine::create_harvests(
                &mut ledger,
                &[harvest(1, 33), harvest(1, 33)],
                now(),
            )
            .expect("create"),
        );
        assert_eq!(r.created.len(), 3);
        let merge = ledger.batch(r.created[2]).expect("read").expect("exists");
        assert_eq!(merge.weight, Weight(66));
        assert_eq!(merge.process_step, r.process_step_id);
        assert_eq!(merge.ins, BTreeSet::from([r.created[0], r.created[1]]));
        let merge_step = ledger
            .process_step(r.process_step_id)
            .expect("read")
            .expect("exists");
        assert_eq!(merge_step.process, MERGE_PROCESS);
        assert_eq!(merge_step.plot, None);
        for id in &r.created[..2] {
            assert!(!ledger.batch(*id).expect("read").expect("exists").active);
        }
        assert!(matches!(r.mints.last(), Some(MintRequest::Leaf { parents, .. }) if parents.len() == 2));
    }

    #[test]
    fn empty_harvest_list_is_no_content() {
        let mut ledger = Ledger::new();
        let outcome = CreationEngine::create_harvests(&mut ledger, &[], now()).expect("create");
        assert_eq!(outcome, CreationOutcome::NoContent);
        assert_eq!(ledger.process_step_count().expect("count"), 0);
    }

    #[test]
    fn harvest_on_unknown_plot_is_not_found() {
        let mut ledger = ledger_with_plots(&[(1, FARMER)]);
        let result = CreationEngine::create_harvests(&mut ledger, &[harvest(2, 10)], now());
        assert!(matches!(result, Err(LotgraphError::NotFound(_))));
    }

    #[test]
    fn harvest_without_plot_is_rejected() {
        let mut ledger = Ledger::new();
        let mut request = harvest(1, 10);
        request.process_step.plot = None;
        let result = CreationEngine::create_harvests(&mut ledger, &[request], now());
        assert!(matches!(result, Err(LotgraphError::BadRequest(_))));
    }

    #[test]
    fn divergent_recipients_are_rejected() {
        let mut ledger = ledger_with_plots(&[(1, FARMER)]);
        let mut other = harvest(1, 10);
        other.recipient = Actor::Company(CompanyId(99));
        let result = CreationEngine::create_harvests(&mut ledger, &[harvest(1, 10), other], now());
        assert!(matches!(result, Err(LotgraphError::BadRequest(_))));
        assert_eq!(ledger.batch_count().expect("count"), 0);
    }

    #[test]
    fn combined_harvest_splits_then_merges() {
        let mut ledger = ledger_with_plots(&[(1, FARMER), (2, FARMER)]);
        let request = CombinedHarvestRequest {
            weight: Weight(100),
            recipient: Actor::Company(BUYER),
            external_id: None,
            classification: None,
            process_step: step(None, ""),
            plots: vec![PlotId(1), PlotId(2)],
        };
        let r = receipt(
            CreationEngine::create_combined_harvests(&mut ledger, &request, now())
                .expect("create"),
        );
        let batches = ledger
            .batches(&r.created.iter().copied().collect())
            .expect("read");
        assert_eq!(batches[0].weight, Weight(50));
        assert_eq!(batches[1].weight, Weight(50));
        assert_eq!(batches[2].weight, Weight(100));
        assert!(!batches[0].active && !batches[1].active && batches[2].active);

        let first_step = ledger
            .process_step(batches[0].process_step)
            .expect("read")
            .expect("exists");
        let second_step = ledger
            .process_step(batches[1].process_step)
            .expect("read")
            .expect("exists");
        assert_eq!(first_step.plot, Some(PlotId(1)));
        assert_eq!(second_step.plot, Some(PlotId(2)));
    }

    #[test]
    fn combined_harvest_rejects_foreign_plot() {
        let mut ledger = ledger_with_plots(&[(1, FARMER), (2, IndividualId(8))]);
        let request = CombinedHarvestRequest {
            weight: Weight(100),
            recipient: Actor::Company(BUYER),
            external_id: None,
            classification: None,
            process_step: step(None, ""),
            plots: vec![PlotId(1), PlotId(2)],
        };
        let result = CreationEngine::create_combined_harvests(&mut ledger, &request, now());
        assert!(matches!(result, Err(LotgraphError::BadRequest(_))));
        assert_eq!(ledger.batch_count().expect("count"), 0);
    }

    #[test]
    fn combined_harvest_without_plots_is_no_content() {
        let mut ledger = Ledger::new();
        let request = CombinedHarvestRequest {
            weight: Weight(100),
            recipient: Actor::Company(BUYER),
            external_id: None,
            classification: None,
            process_step: step(None, ""),
            plots: vec![],
        };
        let outcome =
            CreationEngine::create_combined_harvests(&mut ledger, &request, now()).expect("ok");
        assert_eq!(outcome, CreationOutcome::NoContent);
    }

    #[test]
    fn split_consumes_predecessor() {
        let mut ledger = ledger_with_plots(&[(1, FARMER)]);
        let origin = receipt(
            CreationEngine::create_harvests(&mut ledger, &[harvest(1, 90)], now()).expect("h"),
        )
        .created[0];

        let r = receipt(
            CreationEngine::create_batches(
                &mut ledger,
                &[derived(&[origin], 45), derived(&[origin], 45)],
                now(),
            )
            .expect("split"),
        );
        assert_eq!(r.created.len(), 2);
        assert!(!ledger.batch(origin).expect("read").expect("exists").active);
        for id in &r.created {
            let batch = ledger.batch(*id).expect("read").expect("exists");
            assert!(batch.active);
            assert_eq!(batch.process_step, r.process_step_id);
        }
        assert_eq!(ledger.process_step_count().expect("count"), 2);
    }

    #[test]
    fn unknown_predecessor_creates_nothing() {
        let mut ledger = ledger_with_plots(&[(1, FARMER)]);
        let origin = receipt(
            CreationEngine::create_harvests(&mut ledger, &[harvest(1, 90)], now()).expect("h"),
        )
        .created[0];
        let before = ledger.batch_count().expect("count");

        let result = CreationEngine::create_batches(
            &mut ledger,
            &[derived(&[origin], 10), derived(&[BatchId(404)], 10)],
            now(),
        );
        assert!(matches!(result, Err(LotgraphError::NotFound(_))));
        assert_eq!(ledger.batch_count().expect("count"), before);
        assert!(ledger.batch(origin).expect("read").expect("exists").active);
    }

    #[test]
    fn inactive_predecessor_is_rejected() {
        let mut ledger = ledger_with_plots(&[(1, FARMER)]);
        let origin = receipt(
            CreationEngine::create_harvests(&mut ledger, &[harvest(1, 90)], now()).expect("h"),
        )
        .created[0];
        CreationEngine::create_batches(&mut ledger, &[derived(&[origin], 90)], now())
            .expect("first use");

        let result = CreationEngine::create_batches(&mut ledger, &[derived(&[origin], 90)], now());
        match result {
            Err(LotgraphError::BadRequest(msg)) => assert!(msg.contains("already inactive")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn first_failing_request_decides_error() {
        let mut ledger = ledger_with_plots(&[(1, FARMER)]);
        let origin = receipt(
            CreationEngine::create_harvests(&mut ledger, &[harvest(1, 90)], now()).expect("h"),
        )
        .created[0];
        CreationEngine::create_batches(&mut ledger, &[derived(&[origin], 90)], now())
            .expect("roast");
        let before = ledger.batch_count().expect("count");

        // The unknown batch sorts after the inactive one but comes first.
        let result = CreationEngine::create_batches(
            &mut ledger,
            &[derived(&[BatchId(50)], 10), derived(&[origin], 10)],
            now(),
        );
        assert!(matches!(result, Err(LotgraphError::NotFound(_))));

        let result = CreationEngine::create_batches(
            &mut ledger,
            &[derived(&[origin], 10), derived(&[BatchId(50)], 10)],
            now(),
        );
        assert!(matches!(result, Err(LotgraphError::BadRequest(_))));
        assert_eq!(ledger.batch_count().expect("count"), before);
    }

    #[test]
    fn combined_harvest_rejects_oversized_codes() {
        let mut ledger = ledger_with_plots(&[(1, FARMER)]);
        let request = CombinedHarvestRequest {
            weight: Weight(100),
            recipient: Actor::Company(BUYER),
            external_id: Some("x".repeat(crate::primitives::MAX_CODE_LENGTH + 1)),
            classification: None,
            process_step: step(None, ""),
            plots: vec![PlotId(1)],
        };
        let result = CreationEngine::create_combined_harvests(&mut ledger, &request, now());
        assert!(matches!(result, Err(LotgraphError::BadRequest(_))));
        assert_eq!(ledger.batch_count().expect("count"), 0);
    }

    #[test]
    fn generic_step_with_plot_is_rejected() {
        let mut ledger = Ledger::new();
        let mut request = derived(&[], 10);
        request.process_step.plot = Some(PlotId(1));
        let result = CreationEngine::create_batches(&mut ledger, &[request], now());
        assert!(matches!(result, Err(LotgraphError::BadRequest(_))));
    }
}
