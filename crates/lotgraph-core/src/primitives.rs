//! # Ledger Primitives
//!
//! Hardcoded runtime constants for the lotgraph CORE.
//!
//! These values are compiled into the binary and are immutable at runtime.
//!
//! ## Primitives
//!
//! 1. **Process names**: the fixed process kinds the engine itself produces.
//! 2. **Verification rule**: how many proofs a plot needs to be verified.
//! 3. **Limits**: bounds on request sizes and traversal depth.

/// Process name recorded for origin batches.
pub const HARVEST_PROCESS: &str = "Harvesting";

/// Process name recorded for batches that combine parallel harvest lots.
pub const MERGE_PROCESS: &str = "Merge";

/// Location recorded when a request leaves the location blank.
pub const DEFAULT_LOCATION: &str = "Unknown";

/// Number of proofs a plot must carry for its harvests to count as verified.
///
/// Ownership and freedom-from-deforestation. A plot with fewer OR more
/// proofs is treated as unverified.
pub const REQUIRED_PROOF_COUNT: usize = 2;

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum number of batch requests accepted in one creation call.
pub const MAX_REQUESTS_PER_CALL: usize = 1000;

/// Maximum number of plots in one combined harvest.
pub const MAX_PLOTS_PER_COMBINED_HARVEST: usize = 500;

/// Maximum number of predecessors a single batch may consume.
pub const MAX_INS_PER_BATCH: usize = 1000;

/// Maximum length for process names.
pub const MAX_PROCESS_NAME_LENGTH: usize = 128;

/// Maximum length for locations.
pub const MAX_LOCATION_LENGTH: usize = 512;

/// Maximum length for external ids and classification codes.
pub const MAX_CODE_LENGTH: usize = 128;

// =============================================================================
// TRAVERSAL LIMITS
// =============================================================================

/// Maximum number of layers the export builder expands in each direction.
///
/// Provenance chains are short in practice; hitting this bound means the
/// stored graph is corrupt or adversarial.
pub const MAX_EXPORT_DEPTH: usize = 256;

/// Maximum number of nodes materialized into one export tree.
///
/// Tree semantics duplicate shared ancestors, so wide diamonds grow
/// exponentially with depth.
pub const MAX_EXPORT_NODES: usize = 100_000;

/// Maximum number of batches discovered by one lineage walk.
pub const MAX_RELATED_BATCHES: usize = 100_000;
