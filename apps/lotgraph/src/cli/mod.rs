//! # lotgraph CLI Module
//!
//! ## Available Commands
//!
//! - `server` - Start the HTTP server
//! - `init` - Initialize a new database
//! - `status` - Show ledger metrics
//! - `plots import` - Sync plots of land from a JSON file
//! - `harvest` - Record a harvest from a JSON file
//! - `combined-harvest` - Record a multi-plot harvest from a JSON file
//! - `batches` - Derive batches from a JSON file
//! - `show` - Show one batch
//! - `related` - Show a batch's lineage component
//! - `export` - Export a batch's audit tree
//! - `list` - List a company's batches

mod commands;

use crate::config::{Backend, Config};
use clap::{Parser, Subcommand};
use lotgraph_core::LotgraphError;
use std::path::PathBuf;

pub use commands::*;

/// Default database file.
pub const DEFAULT_DATABASE: &str = "lotgraph.db";

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// lotgraph - Batch provenance ledger
///
/// Tracks commodity lots from harvest through merges and splits, and
/// exports their full lineage for compliance audits.
#[derive(Parser, Debug)]
#[command(name = "lotgraph")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the ledger database
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// Storage backend
    #[arg(short = 'B', long, global = true, value_enum)]
    pub backend: Option<Backend>,

    /// Path to a TOML config file
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start HTTP server
    Server {
        /// Host to bind to (overrides config)
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Initialize a new empty database
    Init {
        /// Force initialization even if database exists
        #[arg(short, long)]
        force: bool,
    },

    /// Show ledger status
    Status,

    /// Manage the local copy of the plot registry
    Plots {
        #[command(subcommand)]
        command: PlotsCommand,
    },

    /// Record a harvest from a JSON array of batch requests
    Harvest {
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Record one harvest divided across several plots
    CombinedHarvest {
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Derive new batches from a JSON array of batch requests
    Batches {
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Show one batch with its process step and plot
    Show {
        /// Batch ID
        id: u64,
    },

    /// Show every batch sharing lineage with a batch
    Related {
        /// Batch ID
        id: u64,
    },

    /// Export a batch's audit tree as JSON
    Export {
        /// Batch ID
        id: u64,

        /// Output file path (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the batches held by a company
    List {
        /// Company ID
        #[arg(long)]
        company: u64,

        /// Filter as JSON, e.g. '{"active":true}'
        #[arg(long)]
        filter: Option<String>,

        /// Sort as JSON, e.g. '{"field":"weight","order":"desc"}'
        #[arg(long)]
        sort: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum PlotsCommand {
    /// Upsert plots from a JSON array
    Import {
        #[arg(short, long)]
        file: PathBuf,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Resolved storage settings: CLI flag, then config file, then default.
#[derive(Debug, Clone)]
pub struct Storage {
    pub path: PathBuf,
    pub backend: Backend,
}

impl Storage {
    fn resolve(cli: &Cli, config: &Config) -> Self {
        Self {
            path: cli
                .database
                .clone()
                .or_else(|| config.storage.database.clone())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE)),
            backend: cli.backend.or(config.storage.backend).unwrap_or_default(),
        }
    }
}

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), LotgraphError> {
    let mut config = Config::load(cli.config.as_deref())?;
    let storage = Storage::resolve(&cli, &config);
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Server { host, port }) => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            cmd_server(&storage, &config).await
        }
        Some(Commands::Init { force }) => cmd_init(&storage, force),
        Some(Commands::Plots {
            command: PlotsCommand::Import { file },
        }) => cmd_plots_import(&storage, json_mode, &file),
        Some(Commands::Harvest { file }) => {
            cmd_create(&storage, &config, json_mode, CreateKind::Harvest, &file).await
        }
        Some(Commands::CombinedHarvest { file }) => {
            cmd_create(&storage, &config, json_mode, CreateKind::Combined, &file).await
        }
        Some(Commands::Batches { file }) => {
            cmd_create(&storage, &config, json_mode, CreateKind::Derived, &file).await
        }
        Some(Commands::Show { id }) => cmd_show(&storage, id),
        Some(Commands::Related { id }) => cmd_related(&storage, json_mode, id),
        Some(Commands::Export { id, output }) => cmd_export(&storage, id, output.as_deref()),
        Some(Commands::List {
            company,
            filter,
            sort,
        }) => cmd_list(&storage, json_mode, company, filter, sort),
        Some(Commands::Status) | None => cmd_status(&storage, json_mode),
    }
}
