//! # System Module
//!
//! Ledger metrics reported by `status`.

mod metrics;

pub use metrics::LedgerMetrics;
