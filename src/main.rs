//! # petprice CLI
//!
//! The `petprice` binary drives the collector: schema setup, batch runs,
//! the duplicate sweep, and inspection commands.
//!
//! ## Usage
//!
//! ```bash
//! petprice --config ./config/petprice.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `petprice init` | Create the SQLite database and run schema migrations |
//! | `petprice resolve <name>...` | Show attributes and group key for listing names |
//! | `petprice run --jobs <file>` | Fetch every job from every store and merge the results |
//! | `petprice dedup` | Fold products sharing a normalized name |
//! | `petprice report` | Advisory report on how stored names group |
//! | `petprice stats` | Product, price, and per-store counts |
//!
//! Logs go to stderr and are filtered with `RUST_LOG` (default
//! `petprice=info`); summaries go to stdout.

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use petprice::attributes::{extract, weight_label};
use petprice::config;
use petprice::grouping::classify;
use petprice::ingest::{self, BatchOptions};
use petprice::progress::ProgressMode;
use petprice::{advisory, merge, migrate, stats};

/// petprice: concurrent multi-store pet product price collector.
///
/// All commands except `resolve` read a TOML configuration file given by
/// `--config`. See `config/petprice.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "petprice",
    about = "Concurrent multi-store pet product price collector",
    version,
    long_about = "petprice broadcasts search jobs to one worker per store, resolves the \
    returned listings into canonical product groups with a versioned rule table, and \
    merges them into a SQLite catalog holding one price per product and store."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/petprice.toml`. Database, fetch, merge, and
    /// store settings are read from this file.
    #[arg(long, global = true, default_value = "./config/petprice.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the products/prices tables.
    /// Running it again is safe.
    Init,

    /// Resolve listing names into attributes and group keys.
    ///
    /// Pure and offline: no configuration or database is needed.
    Resolve {
        /// One or more listing names.
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Run a batch: fetch every job from every store and merge the results.
    Run {
        /// Jobs file (TOML, `[[jobs]]` entries with `code` and `name`).
        #[arg(long)]
        jobs: PathBuf,

        /// Maximum number of jobs to process.
        #[arg(long)]
        limit: Option<usize>,

        /// Fetch and resolve without writing to the database.
        #[arg(long)]
        dry_run: bool,

        /// Print the run summary as JSON.
        #[arg(long)]
        json: bool,

        /// Progress output on stderr: `off`, `human`, or `json`.
        /// Defaults to `human` when stderr is a terminal.
        #[arg(long, value_parser = parse_progress)]
        progress: Option<ProgressMode>,
    },

    /// Fold products sharing a normalized name into the oldest one.
    ///
    /// Prices are moved to the kept product before duplicates are deleted.
    Dedup {
        /// Show the duplicate groups without changing anything.
        #[arg(long)]
        dry_run: bool,

        /// Print the sweep report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Advisory report on how stored product names group.
    ///
    /// Flags group keys that look like one product split in two. It never
    /// merges anything.
    Report {
        /// Number of examples to list per section.
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Show catalog statistics.
    Stats,
}

fn parse_progress(s: &str) -> Result<ProgressMode, String> {
    match s {
        "off" => Ok(ProgressMode::Off),
        "human" => Ok(ProgressMode::Human),
        "json" => Ok(ProgressMode::Json),
        other => Err(format!(
            "unknown progress mode '{}': expected off, human, or json",
            other
        )),
    }
}

fn print_resolved(name: &str) {
    let classification = classify(name);
    let attrs = extract(name);

    println!("{}", name);
    println!("  key: {}", classification.key);
    if let Some(brand) = classification.brand {
        println!("  brand: {}", brand);
    }
    if let Some(species) = attrs.species {
        println!("  species: {}", species.label());
    }
    if let Some(stage) = attrs.life_stage {
        println!("  life stage: {}", stage.label());
    }
    if let Some(size) = attrs.body_size {
        println!("  size: {}", size.label());
    }
    if let Some(flavor) = &attrs.flavor {
        println!("  flavor: {}", flavor);
    }
    if let Some(line) = &attrs.brand_line {
        println!("  line: {}", line);
    }
    if let Some(pack) = attrs.pack_quantity {
        println!("  pack: {}", pack.label());
    }
    if let Some(weight) = weight_label(name) {
        println!("  variant: {}", weight);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "petprice=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Resolve { names } => {
            for (i, name) in names.iter().enumerate() {
                if i > 0 {
                    println!();
                }
                print_resolved(name);
            }
        }
        Commands::Init => {
            let cfg = config::load_config(&cli.config)?;
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Run {
            jobs,
            limit,
            dry_run,
            json,
            progress,
        } => {
            if limit == Some(0) {
                bail!("--limit must be at least 1");
            }
            let cfg = config::load_config(&cli.config)?;
            let mode = progress.unwrap_or_else(ProgressMode::default_for_tty);
            ingest::run_cmd(&cfg, &jobs, BatchOptions { dry_run, limit }, json, mode).await?;
        }
        Commands::Dedup { dry_run, json } => {
            let cfg = config::load_config(&cli.config)?;
            merge::run_dedup(&cfg, dry_run, json).await?;
        }
        Commands::Report { limit } => {
            let cfg = config::load_config(&cli.config)?;
            advisory::run_report(&cfg, limit).await?;
        }
        Commands::Stats => {
            let cfg = config::load_config(&cli.config)?;
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
