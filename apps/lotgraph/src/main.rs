//! # lotgraph - Batch Provenance Ledger
//!
//! ## Usage
//!
//! ```bash
//! # Start the HTTP server
//! lotgraph server --host 0.0.0.0 --port 8080
//!
//! # CLI operations
//! lotgraph plots import -f plots.json
//! lotgraph harvest -f harvest.json
//! lotgraph related 42
//! lotgraph export 42 -o audit.json
//! ```

use clap::Parser;
use lotgraph::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // LOTGRAPH_LOG_FORMAT=json switches to machine-parseable output.
    let log_format = std::env::var("LOTGRAPH_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "lotgraph=info,tower_http=debug".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    let cli = cli::Cli::parse();

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

fn print_banner() {
    println!(
        r"
  ┬  ┌─┐┌┬┐┌─┐┬─┐┌─┐┌─┐┬ ┬
  │  │ │ │ │ ┬├┬┘├─┤├─┘├─┤
  ┴─┘└─┘ ┴ └─┘┴└─┴ ┴┴  ┴ ┴

  Batch provenance ledger v{}
",
        env!("CARGO_PKG_VERSION")
    );
}
