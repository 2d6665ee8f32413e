//! # Query Module
//!
//! Structured filter and sort payloads for company batch listings.
//!
//! Payloads arrive as JSON from callers and are deserialized strictly:
//! unknown fields are rejected, and [`BatchFilter::validate`] rejects
//! inverted ranges and empty process names. No free-form expressions
//! are accepted.

use crate::{Batch, LotgraphError, ProcessStep, Weight};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

// =============================================================================
// FILTER
// =============================================================================

/// Conjunctive filter over a batch and its process step.
///
/// Absent fields match everything. Ranges are inclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchFilter {
    #[serde(default)]
    pub active: Option<bool>,
    /// Exact process name of the batch's step.
    #[serde(default)]
    pub process: Option<String>,
    #[serde(default)]
    pub min_weight: Option<Weight>,
    #[serde(default)]
    pub max_weight: Option<Weight>,
    #[serde(default)]
    pub processed_after: Option<DateTime<Utc>>,
    #[serde(default)]
    pub processed_before: Option<DateTime<Utc>>,
}

impl BatchFilter {
    /// Reject filters that can never be meant.
    pub fn validate(&self) -> Result<(), LotgraphError> {
        if let (Some(min), Some(max)) = (self.min_weight, self.max_weight)
            && min > max
        {
            return Err(LotgraphError::BadRequest(format!(
                "min_weight {min} is greater than max_weight {max}"
            )));
        }
        if let (Some(after), Some(before)) = (self.processed_after, self.processed_before)
            && after > before
        {
            return Err(LotgraphError::BadRequest(
                "processed_after is later than processed_before".to_string(),
            ));
        }
        if self.process.as_deref().is_some_and(|p| p.trim().is_empty()) {
            return Err(LotgraphError::BadRequest(
                "process filter must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether `batch` (produced by `step`) passes the filter.
    #[must_use]
    pub fn matches(&self, batch: &Batch, step: &ProcessStep) -> bool {
        self.active.is_none_or(|a| batch.active == a)
            && self.process.as_deref().is_none_or(|p| step.process == p)
            && self.min_weight.is_none_or(|w| batch.weight >= w)
            && self.max_weight.is_none_or(|w| batch.weight <= w)
            && self
                .processed_after
                .is_none_or(|d| step.date_of_process >= d)
            && self
                .processed_before
                .is_none_or(|d| step.date_of_process <= d)
    }
}

// =============================================================================
// SORT
// =============================================================================

/// Field a listing is ordered by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    Id,
    Weight,
    DateOfProcess,
    DateOfEntry,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Sort specification. Defaults to id ascending.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchSort {
    #[serde(default)]
    pub field: SortField,
    #[serde(default)]
    pub order: SortOrder,
}

impl BatchSort {
    /// Compare two listed batches. Ties fall back to id ascending.
    #[must_use]
    pub fn compare(&self, a: (&Batch, &ProcessStep), b: (&Batch, &ProcessStep)) -> Ordering {
        let primary = match self.field {
            SortField::Id => a.0.id.cmp(&b.0.id),
            SortField::Weight => a.0.weight.cmp(&b.0.weight),
            SortField::DateOfProcess => a.1.date_of_process.cmp(&b.1.date_of_process),
            SortField::DateOfEntry => a.1.date_of_entry.cmp(&b.1.date_of_entry),
        };
        let primary = match self.order {
            SortOrder::Asc => primary,
            SortOrder::Desc => primary.reverse(),
        };
        primary.then_with(|| a.0.id.cmp(&b.0.id))
    }
}
