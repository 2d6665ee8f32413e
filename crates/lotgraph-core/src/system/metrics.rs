//! # Ledger Metrics
//!
//! Record counts of a store, plus the share of batches still active.
//! Integer arithmetic only.

use crate::LotgraphError;
use crate::ledger::RecordStore;
use serde::{Deserialize, Serialize};

/// Record counts of a ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerMetrics {
    /// Total number of batches.
    pub batch_count: usize,
    /// Batches not yet consumed.
    pub active_batch_count: usize,
    /// Provenance edges.
    pub edge_count: usize,
    pub process_step_count: usize,
    pub plot_count: usize,
    /// Active batches per million batches (0 if the ledger is empty).
    pub active_millionths: u64,
}

impl LedgerMetrics {
    /// Collect metrics from a store.
    pub fn from_store<S: RecordStore + ?Sized>(store: &S) -> Result<Self, LotgraphError> {
        let batch_count = store.batch_count()?;
        let active_batch_count = store.active_batch_count()?;

        let active_millionths = if batch_count > 0 {
            (active_batch_count as u64).saturating_mul(1_000_000) / (batch_count as u64)
        } else {
            0
        };

        Ok(Self {
            batch_count,
            active_batch_count,
            edge_count: store.edge_count()?,
            process_step_count: store.process_step_count()?,
            plot_count: store.plot_count()?,
            active_millionths,
        })
    }

    /// Batches that were consumed by a later batch.
    #[must_use]
    pub fn consumed_batch_count(&self) -> usize {
        self.batch_count.saturating_sub(self.active_batch_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::creation::CreationEngine;
    use crate::ledger::{Ledger, PlotRegistry};
    use crate::{
        Actor, BatchCreateRequest, CompanyId, IndividualId, Plot, PlotId, ProcessStepInput, Weight,
    };
    use chrono::{DateTime, Utc};

    #[test]
    fn empty_ledger_has_zero_metrics() {
        let metrics = LedgerMetrics::from_store(&Ledger::new()).expect("metrics");
        assert_eq!(metrics, LedgerMetrics::default());
    }

    #[test]
    fn merge_is_counted() {
        let mut ledger = Ledger::new();
        ledger
            .upsert_plot(Plot {
                id: PlotId(1),
                farmer: IndividualId(1),
                description: String::new(),
                proofs: vec![],
            })
            .expect("upsert");
        let request = BatchCreateRequest {
            weight: Weight(33),
            ins: vec![],
            external_id: None,
            classification: None,
            recipient: Actor::Company(CompanyId(1)),
            process_step: ProcessStepInput {
                location: String::new(),
                date_of_process: DateTime::<Utc>::UNIX_EPOCH,
                process: String::new(),
                executed_by: Actor::Individual(IndividualId(1)),
                recorded_by: Actor::Individual(IndividualId(1)),
                plot: Some(PlotId(1)),
            },
        };
        CreationEngine::create_harvests(
            &mut ledger,
            &[request.clone(), request],
            DateTime::<Utc>::UNIX_EPOCH,
        )
        .expect("create");

        let metrics = LedgerMetrics::from_store(&ledger).expect("metrics");
        assert_eq!(metrics.batch_count, 3);
        assert_eq!(metrics.active_batch_count, 1);
        assert_eq!(metrics.consumed_batch_count(), 2);
        assert_eq!(metrics.edge_count, 2);
        assert_eq!(metrics.process_step_count, 3);
        assert_eq!(metrics.plot_count, 1);
        assert_eq!(metrics.active_millionths, 333_333);
    }
}
