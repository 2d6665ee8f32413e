//! # Storage Module
//!
//! Disk-backed ledger storage using redb.

mod redb_ledger;

pub use redb_ledger::RedbLedger;
