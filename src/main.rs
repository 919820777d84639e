//! # Docsense CLI (`kb`)
//!
//! ## Usage
//!
//! ```bash
//! kb --config ./config/kb.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `kb serve` | Start the refresh scheduler and the HTTP API |
//! | `kb refresh` | Run one refresh cycle and print its report |
//! | `kb search "<query>"` | Refresh once, then answer a query |
//! | `kb categories` | Print the configured taxonomy |
//!
//! Logging is controlled with `RUST_LOG` (default `docsense=info`).

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use docsense::config::{load_config, Config};
use docsense::knowledge::KnowledgeBase;
use docsense::refresh::RefreshOutcome;
use docsense::server::run_server;
use docsense_core::QueryOutcome;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Docsense: a documentation knowledge engine for support assistants.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/kb.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "kb",
    about = "Docsense: crawl, categorize, and search product documentation",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/kb.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API and refresh on the configured interval.
    Serve,

    /// Run a single refresh cycle and print the report as JSON.
    Refresh,

    /// Build a fresh index and answer one query.
    Search {
        /// Free-text question.
        query: String,

        /// Restrict results to one category.
        #[arg(long)]
        category: Option<String>,

        /// Maximum number of results (defaults to `retrieval.default_k`).
        #[arg(long)]
        k: Option<usize>,
    },

    /// List configured categories and their descriptors.
    Categories,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("docsense=info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Serve => serve(config).await,
        Commands::Refresh => {
            let kb = KnowledgeBase::open(&config).await?;
            let report = kb
                .scheduler
                .refresh_now()
                .await
                .context("a refresh cycle is already running")?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if let RefreshOutcome::Failed { reason } = report.outcome {
                bail!("refresh failed: {}", reason);
            }
            Ok(())
        }
        Commands::Search { query, category, k } => {
            let kb = KnowledgeBase::open(&config).await?;
            let report = kb
                .scheduler
                .refresh_now()
                .await
                .context("a refresh cycle is already running")?;
            if let RefreshOutcome::Failed { reason } = report.outcome {
                bail!("refresh failed: {}", reason);
            }
            let k = k.unwrap_or(kb.default_k);
            let engine = kb.engine.clone();
            let result = tokio::task::spawn_blocking(move || {
                engine.query(&query, category.as_deref(), k)
            })
            .await??;
            print_result(&result);
            Ok(())
        }
        Commands::Categories => {
            for category in config.taxonomy().categories() {
                println!("{}: {}", category.name, category.descriptors.join(", "));
            }
            Ok(())
        }
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let kb = KnowledgeBase::open(&config).await?;
    let scheduler = kb.scheduler.clone();
    tokio::spawn(scheduler.run(config.refresh.interval(), config.refresh.on_start));
    run_server(kb, &config.server.bind).await
}

fn print_result(result: &docsense_core::QueryResult) {
    match result.outcome {
        QueryOutcome::NoCandidates => {
            println!("No indexed content for that category yet.");
            return;
        }
        QueryOutcome::NoConfidentMatch => {
            println!("No confident match. Try rephrasing, or search without a category.");
            return;
        }
        QueryOutcome::Matched => {}
    }
    for (i, hit) in result.hits.iter().enumerate() {
        println!(
            "{}. [{:.3}] {}{}",
            i + 1,
            hit.score,
            hit.path.join(" › "),
            hit.matched_category
                .as_deref()
                .map(|c| format!(" ({})", c))
                .unwrap_or_default()
        );
        println!("   {}", hit.snippet.replace('\n', " "));
        if let Some(url) = &hit.source_url {
            println!("   More: {}", url);
        }
        println!();
    }
}
