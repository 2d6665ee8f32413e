//! Creation request payloads and their boundary validation.

use super::{Actor, BatchId, LotgraphError, PlotId, ProcessStep, ProcessStepId, Weight};
use crate::primitives::{
    DEFAULT_LOCATION, MAX_CODE_LENGTH, MAX_INS_PER_BATCH, MAX_LOCATION_LENGTH,
    MAX_PROCESS_NAME_LENGTH,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Process step data supplied by a caller; ids and entry date are assigned
/// by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessStepInput {
    #[serde(default)]
    pub location: String,
    pub date_of_process: DateTime<Utc>,
    #[serde(default)]
    pub process: String,
    pub executed_by: Actor,
    pub recorded_by: Actor,
    #[serde(default)]
    pub plot: Option<PlotId>,
}

impl ProcessStepInput {
    /// Check string bounds.
    pub fn validate(&self) -> Result<(), LotgraphError> {
        if self.location.len() > MAX_LOCATION_LENGTH {
            return Err(LotgraphError::BadRequest(format!(
                "location length {} exceeds maximum {}",
                self.location.len(),
                MAX_LOCATION_LENGTH
            )));
        }
        if self.process.len() > MAX_PROCESS_NAME_LENGTH {
            return Err(LotgraphError::BadRequest(format!(
                "process name length {} exceeds maximum {}",
                self.process.len(),
                MAX_PROCESS_NAME_LENGTH
            )));
        }
        Ok(())
    }

    /// Materialize the step under `id`.
    ///
    /// `process` overrides the caller-supplied process name when the engine
    /// fixes it (harvest, merge). Blank locations are defaulted.
    #[must_use]
    pub fn to_step(
        &self,
        id: ProcessStepId,
        process: Option<&str>,
        plot: Option<PlotId>,
        recorded_at: DateTime<Utc>,
    ) -> ProcessStep {
        let location = if self.location.trim().is_empty() {
            DEFAULT_LOCATION.to_string()
        } else {
            self.location.clone()
        };
        ProcessStep {
            id,
            location,
            date_of_process: self.date_of_process,
            date_of_entry: recorded_at,
            process: process.unwrap_or(&self.process).to_string(),
            executed_by: self.executed_by,
            recorded_by: self.recorded_by,
            plot,
        }
    }
}

/// Request to create one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCreateRequest {
    pub weight: Weight,
    #[serde(default)]
    pub ins: Vec<BatchId>,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub classification: Option<String>,
    pub recipient: Actor,
    pub process_step: ProcessStepInput,
}

impl BatchCreateRequest {
    /// Check weight, code lengths and predecessor count.
    pub fn validate(&self) -> Result<(), LotgraphError> {
        if self.weight.value() == 0 {
            return Err(LotgraphError::BadRequest(
                "batch weight must be positive".to_string(),
            ));
        }
        validate_code("external id", self.external_id.as_deref())?;
        validate_code("classification", self.classification.as_deref())?;
        if self.ins.len() > MAX_INS_PER_BATCH {
            return Err(LotgraphError::BadRequest(format!(
                "{} predecessors exceeds maximum {}",
                self.ins.len(),
                MAX_INS_PER_BATCH
            )));
        }
        self.process_step.validate()
    }
}

/// Request to harvest several plots of one farmer under a single step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombinedHarvestRequest {
    /// Total weight, divided evenly across the plots.
    pub weight: Weight,
    pub recipient: Actor,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub classification: Option<String>,
    pub process_step: ProcessStepInput,
    pub plots: Vec<PlotId>,
}

impl CombinedHarvestRequest {
    /// Check code lengths and the step's string bounds.
    pub fn validate(&self) -> Result<(), LotgraphError> {
        validate_code("external id", self.external_id.as_deref())?;
        validate_code("classification", self.classification.as_deref())?;
        self.process_step.validate()
    }
}

fn validate_code(field: &str, code: Option<&str>) -> Result<(), LotgraphError> {
    match code {
        Some(c) if c.len() > MAX_CODE_LENGTH => Err(LotgraphError::BadRequest(format!(
            "{field} length {} exceeds maximum {MAX_CODE_LENGTH}",
            c.len()
        ))),
        _ => Ok(()),
    }
}
