//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use super::Storage;
use crate::api;
use crate::config::{Backend, Config};
use crate::notary::{dispatch_mints, notary_from_config};
use chrono::Utc;
use lotgraph_core::{
    BatchCreateRequest, BatchFilter, BatchId, BatchSort, CombinedHarvestRequest, CompanyId,
    CreationEngine, CreationOutcome, LedgerMetrics, LotgraphError, Plot, PlotRegistry, Session,
    export_batch, read_batch_by_id, read_batches_by_company, read_related_batches,
};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum size of a request or plot file (100 MB).
const MAX_INPUT_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), LotgraphError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| LotgraphError::IoError(format!("Cannot read file metadata: {e}")))?;

    if metadata.len() > max_size {
        return Err(LotgraphError::SerializationError(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Canonicalize an input path and require a regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, LotgraphError> {
    let canonical = path.canonicalize().map_err(|e| {
        LotgraphError::IoError(format!("Invalid file path '{}': {e}", path.display()))
    })?;

    if !canonical.is_file() {
        return Err(LotgraphError::IoError(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

/// Canonicalize the parent of an output path and require a directory.
fn validate_output_path(path: &Path) -> Result<PathBuf, LotgraphError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let canonical_parent = parent.canonicalize().map_err(|e| {
        LotgraphError::IoError(format!(
            "Invalid output directory '{}': {e}",
            parent.display()
        ))
    })?;

    if !canonical_parent.is_dir() {
        return Err(LotgraphError::IoError(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| LotgraphError::IoError("Output path has no filename".to_string()))?;

    Ok(canonical_parent.join(filename))
}

/// Read and decode a JSON input file.
fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, LotgraphError> {
    let path = validate_file_path(path)?;
    validate_file_size(&path, MAX_INPUT_FILE_SIZE)?;
    let text = std::fs::read_to_string(&path)
        .map_err(|e| LotgraphError::IoError(format!("Read '{}': {e}", path.display())))?;
    serde_json::from_str(&text).map_err(|e| {
        LotgraphError::SerializationError(format!("Invalid JSON in '{}': {e}", path.display()))
    })
}

fn to_pretty_json<T: serde::Serialize>(value: &T) -> Result<String, LotgraphError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| LotgraphError::SerializationError(e.to_string()))
}

// =============================================================================
// SERVER COMMAND
// =============================================================================

/// Start the HTTP server.
pub async fn cmd_server(storage: &Storage, config: &Config) -> Result<(), LotgraphError> {
    let session = load_or_create_session(storage)?;

    println!("lotgraph ledger server starting...");
    println!();
    println!("Configuration:");
    println!("  Host:     {}", config.server.host);
    println!("  Port:     {}", config.server.port);
    println!("  Backend:  {}", storage.backend);
    println!("  Database: {:?}", storage.path);
    println!(
        "  Notary:   {}",
        config.notary.url.as_deref().unwrap_or("(log only)")
    );
    println!();
    println!("Endpoints:");
    println!("  POST /harvests                - Record a harvest");
    println!("  POST /harvests/combined       - Harvest across several plots");
    println!("  POST /batches                 - Derive batches");
    println!("  POST /plots                   - Sync a plot of land");
    println!("  GET  /batches/{{id}}            - Batch details");
    println!("  GET  /batches/{{id}}/related    - Lineage component");
    println!("  GET  /batches/{{id}}/export     - Audit export tree");
    println!("  GET  /companies/{{id}}/batches  - Company holdings");
    println!("  GET  /status                  - Ledger status");
    println!("  GET  /health                  - Health check");
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    api::run_server(config, session).await
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Initialize a new empty database.
pub fn cmd_init(storage: &Storage, force: bool) -> Result<(), LotgraphError> {
    if storage.backend == Backend::Memory {
        println!("Memory backend selected: nothing to initialize");
        return Ok(());
    }

    if storage.path.exists() {
        if !force {
            return Err(LotgraphError::BadRequest(
                "Database already exists. Use --force to overwrite.".to_string(),
            ));
        }
        std::fs::remove_file(&storage.path)
            .map_err(|e| LotgraphError::IoError(format!("Remove old database: {e}")))?;
    }

    let _session = Session::with_redb(&storage.path)?;
    println!("Initialized new redb database at {:?}", storage.path);
    Ok(())
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

/// Show ledger status.
pub fn cmd_status(storage: &Storage, json_mode: bool) -> Result<(), LotgraphError> {
    let session = load_or_create_session(storage)?;
    let metrics = LedgerMetrics::from_store(&session)?;

    if json_mode {
        let output = serde_json::json!({
            "database": storage.path.to_string_lossy(),
            "backend": storage.backend.to_string(),
            "batch_count": metrics.batch_count,
            "active_batch_count": metrics.active_batch_count,
            "consumed_batch_count": metrics.consumed_batch_count(),
            "edge_count": metrics.edge_count,
            "process_step_count": metrics.process_step_count,
            "plot_count": metrics.plot_count,
            "active_millionths": metrics.active_millionths
        });
        println!("{}", to_pretty_json(&output)?);
        return Ok(());
    }

    println!("lotgraph Ledger Status");
    println!("======================");
    println!("Database: {:?}", storage.path);
    println!("Backend:  {}", storage.backend);
    println!();
    println!("Batches:        {}", metrics.batch_count);
    println!("  Active:       {}", metrics.active_batch_count);
    println!("  Consumed:     {}", metrics.consumed_batch_count());
    println!("Edges:          {}", metrics.edge_count);
    println!("Process steps:  {}", metrics.process_step_count);
    println!("Plots:          {}", metrics.plot_count);

    Ok(())
}

// =============================================================================
// PLOTS COMMAND
// =============================================================================

/// Upsert every plot of a JSON array into the local registry copy.
pub fn cmd_plots_import(
    storage: &Storage,
    json_mode: bool,
    file: &Path,
) -> Result<(), LotgraphError> {
    let plots: Vec<Plot> = read_json(file)?;
    let mut session = load_or_create_session(storage)?;

    let count = plots.len();
    for plot in plots {
        session.upsert_plot(plot)?;
    }

    if json_mode {
        println!("{}", to_pretty_json(&serde_json::json!({ "imported": count }))?);
    } else {
        println!("Imported {count} plot(s)");
    }
    Ok(())
}

// =============================================================================
// CREATION COMMANDS
// =============================================================================

/// Which creation operation a file feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateKind {
    /// `Vec<BatchCreateRequest>` of harvested lots.
    Harvest,
    /// A single `CombinedHarvestRequest`.
    Combined,
    /// `Vec<BatchCreateRequest>` consuming existing batches.
    Derived,
}

/// Run one creation call from a JSON file, then notarize.
pub async fn cmd_create(
    storage: &Storage,
    config: &Config,
    json_mode: bool,
    kind: CreateKind,
    file: &Path,
) -> Result<(), LotgraphError> {
    let mut session = load_or_create_session(storage)?;
    let now = Utc::now();

    let outcome = match kind {
        CreateKind::Harvest => {
            let requests: Vec<BatchCreateRequest> = read_json(file)?;
            CreationEngine::create_harvests(&mut session, &requests, now)?
        }
        CreateKind::Combined => {
            let request: CombinedHarvestRequest = read_json(file)?;
            CreationEngine::create_combined_harvests(&mut session, &request, now)?
        }
        CreateKind::Derived => {
            let requests: Vec<BatchCreateRequest> = read_json(file)?;
            CreationEngine::create_batches(&mut session, &requests, now)?
        }
    };
    drop(session);

    let CreationOutcome::Created(receipt) = outcome else {
        if json_mode {
            println!("{}", to_pretty_json(&serde_json::json!({ "created": [] }))?);
        } else {
            println!("Nothing to create");
        }
        return Ok(());
    };

    let notary =
        notary_from_config(&config.notary).map_err(|e| LotgraphError::IoError(e.to_string()))?;
    let failed = dispatch_mints(notary.as_ref(), &receipt.mints).await;

    if json_mode {
        let output = serde_json::json!({
            "process_step_id": receipt.process_step_id,
            "created": receipt.created,
            "mint_failures": failed
        });
        println!("{}", to_pretty_json(&output)?);
        return Ok(());
    }

    println!("Process step: {}", receipt.process_step_id);
    println!(
        "Created:      {}",
        receipt
            .created
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    );
    if failed > 0 {
        println!("Warning: {failed} notarization request(s) failed, see log");
    }
    Ok(())
}

// =============================================================================
// READ COMMANDS
// =============================================================================

/// Show one batch with its process step and plot.
pub fn cmd_show(storage: &Storage, id: u64) -> Result<(), LotgraphError> {
    let session = load_or_create_session(storage)?;
    let details = read_batch_by_id(&session, BatchId(id))?;
    println!("{}", to_pretty_json(&details)?);
    Ok(())
}

/// Show the lineage component of a batch.
pub fn cmd_related(storage: &Storage, json_mode: bool, id: u64) -> Result<(), LotgraphError> {
    let session = load_or_create_session(storage)?;
    let related = read_related_batches(&session, BatchId(id))?;

    if json_mode {
        println!("{}", to_pretty_json(&related)?);
        return Ok(());
    }

    println!(
        "Lineage of batch {id}: {} batch(es), {} edge(s)",
        related.batches.len(),
        related.edges.len()
    );
    println!();
    for edge in &related.edges {
        let flag = if edge.invalid { "  INVALID" } else { "" };
        println!("  {} -> {}{}", edge.from, edge.to, flag);
    }
    let invalid = related.invalid_edges().count();
    if invalid > 0 {
        println!();
        println!("{invalid} edge(s) descend from plots lacking proofs");
    }
    Ok(())
}

/// Export a batch's audit tree.
pub fn cmd_export(storage: &Storage, id: u64, output: Option<&Path>) -> Result<(), LotgraphError> {
    let session = load_or_create_session(storage)?;
    let snapshot = export_batch(&session, BatchId(id), Utc::now())?;
    let json = to_pretty_json(&snapshot)?;

    match output {
        Some(path) => {
            let path = validate_output_path(path)?;
            std::fs::write(&path, json)
                .map_err(|e| LotgraphError::IoError(format!("Write export: {e}")))?;
            println!(
                "Exported {} node(s) to {:?}",
                snapshot.root_batch.node_count(),
                path
            );
        }
        None => println!("{json}"),
    }
    Ok(())
}

/// List the batches held by a company.
pub fn cmd_list(
    storage: &Storage,
    json_mode: bool,
    company: u64,
    filter: Option<String>,
    sort: Option<String>,
) -> Result<(), LotgraphError> {
    let query = api::ListQuery { filter, sort };
    let (filter, sort): (BatchFilter, BatchSort) = query.parse()?;

    let session = load_or_create_session(storage)?;
    let rows = read_batches_by_company(&session, CompanyId(company), &filter, &sort)?;

    if json_mode {
        println!("{}", to_pretty_json(&rows)?);
        return Ok(());
    }

    println!(
        "{:>8}  {:>12}  {:<6}  {:<20}  {:<6}",
        "ID", "WEIGHT", "ACTIVE", "PROCESS", "PROVEN"
    );
    for row in &rows {
        println!(
            "{:>8}  {:>12}  {:<6}  {:<20}  {:<6}",
            row.batch.id.0,
            row.batch.weight.value(),
            row.batch.active,
            row.process_step.process,
            row.has_all_proofs
        );
    }
    println!();
    println!("{} batch(es)", rows.len());
    Ok(())
}

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Open the configured backend.
pub fn load_or_create_session(storage: &Storage) -> Result<Session, LotgraphError> {
    match storage.backend {
        Backend::Redb => Session::with_redb(&storage.path),
        Backend::Memory => {
            tracing::warn!("Memory backend: records are lost when the process exits");
            Ok(Session::new())
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
