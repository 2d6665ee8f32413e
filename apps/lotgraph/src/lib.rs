//! # lotgraph
//!
//! HTTP server and CLI around the `lotgraph-core` ledger.
//!
//! ```text
//!   CLI (clap) ──┐
//!                ├──▶ lotgraph-core (ledger) ──▶ redb / memory
//!   HTTP (axum) ─┘            │
//!                             ▼ MintRequest
//!                       notary (reqwest)
//! ```

pub mod api;
pub mod cli;
pub mod config;
pub mod notary;
