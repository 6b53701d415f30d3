//! # Remedy CLI (`remedy`)
//!
//! ## Usage
//!
//! ```bash
//! remedy --config ./config/remedy.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `remedy init` | Create the SQLite schema |
//! | `remedy serve` | Start the HTTP server |
//! | `remedy resolve "<text>"` | Resolve error text once and print JSON |
//! | `remedy ingest --error ... --solution ...` | Store a confirmed solution |
//! | `remedy import <file.json>` | Bulk-load seed records |
//! | `remedy stats` | Knowledge-base summary |
//! | `remedy analyze <repo-url>` | Resolve a repository's failed CI runs |

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use remedy::app::Services;
use remedy::config::{self, Config, StoreBackend};
use remedy::pipeline::parse_repo_url;
use remedy::router::BatchItem;
use remedy::{extract, migrate, seed, server, stats};
use remedy_core::NewRecord;

/// Remedy: retrieval-first error resolution for CI and application logs.
#[derive(Parser)]
#[command(name = "remedy", version, about)]
struct Cli {
    /// Path to configuration file (TOML). Defaults apply when it is absent.
    #[arg(long, global = true, default_value = "./config/remedy.toml")]
    config: PathBuf,

    /// Enable debug logging (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the SQLite schema. Idempotent.
    Init,

    /// Start the HTTP server on `[server].bind`.
    Serve {
        /// Seed file imported before the server starts.
        #[arg(long)]
        seed: Option<PathBuf>,
    },

    /// Resolve error text once and print the resolution as JSON.
    Resolve {
        /// Error text. Reads `--file` instead when omitted.
        text: Option<String>,

        /// Log file to extract the error excerpt from.
        #[arg(long, conflicts_with = "text")]
        file: Option<PathBuf>,
    },

    /// Store a confirmed (error, solution) pair.
    Ingest {
        #[arg(long)]
        error: String,

        #[arg(long)]
        solution: String,

        #[arg(long, default_value_t = 0.95)]
        confidence: f64,

        #[arg(long, default_value = "user_verified")]
        source: String,
    },

    /// Import seed records from a JSON array file.
    Import { path: PathBuf },

    /// Print knowledge-base statistics.
    Stats,

    /// List a repository's failed CI runs and resolve each one.
    Analyze {
        /// Repository URL, e.g. `https://github.com/owner/repo`.
        url: String,
    },
}

fn load(path: &Path) -> Result<Config> {
    if path.exists() {
        config::load_config(path)
    } else {
        warn!(path = %path.display(), "config file not found, using defaults");
        Ok(Config::default())
    }
}

fn warn_if_ephemeral(cfg: &Config) {
    if cfg.store.backend == StoreBackend::Memory {
        warn!("store.backend is \"memory\"; records written by this command are discarded on exit");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let cfg = load(&cli.config)?;

    match cli.command {
        Commands::Init => match cfg.store.backend {
            StoreBackend::Sqlite => {
                migrate::run_migrations(&cfg).await?;
                println!("Database initialized successfully.");
            }
            StoreBackend::Memory => {
                println!("store.backend is \"memory\"; nothing to initialize.");
            }
        },
        Commands::Serve { seed: seed_path } => {
            let services = Services::from_config(&cfg).await?;
            if let Some(path) = seed_path {
                let ids = seed::import_file(services.knowledge_base(), &path).await?;
                info!(records = ids.len(), path = %path.display(), "imported seed records");
            }
            server::run_server_with_services(Arc::new(services)).await?;
        }
        Commands::Resolve { text, file } => {
            let query = match (text, file) {
                (Some(text), _) => text,
                (None, Some(path)) => {
                    let content = std::fs::read_to_string(&path)
                        .with_context(|| format!("Failed to read log file: {}", path.display()))?;
                    extract::extract_error_excerpt(&content)
                }
                (None, None) => anyhow::bail!("provide error text or --file"),
            };
            let services = Services::from_config(&cfg).await?;
            let resolution = services.router.resolve(&query).await?;
            println!("{}", serde_json::to_string_pretty(&resolution)?);
        }
        Commands::Ingest {
            error,
            solution,
            confidence,
            source,
        } => {
            warn_if_ephemeral(&cfg);
            let services = Services::from_config(&cfg).await?;
            let id = services
                .knowledge_base()
                .ingest(NewRecord::new(error, solution, confidence, source))
                .await?;
            println!("Stored record {}", id);
        }
        Commands::Import { path } => {
            warn_if_ephemeral(&cfg);
            let services = Services::from_config(&cfg).await?;
            let ids = seed::import_file(services.knowledge_base(), &path).await?;
            println!("Imported {} records", ids.len());
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Analyze { url } => {
            let (owner, repo) = parse_repo_url(&url)?;
            let services = Services::from_config(&cfg).await?;
            let listing = services.inspector.list_failures(&owner, &repo).await;
            if let Some(err) = &listing.error {
                warn!(error = %err, "pipeline listing incomplete");
            }
            let items = listing
                .failures
                .iter()
                .map(|f| BatchItem {
                    label: format!("{} #{}", f.workflow_name, f.run_id),
                    text: f.error_text(),
                })
                .collect();
            let batch = services.router.resolve_batch(items).await;
            println!("{}", serde_json::to_string_pretty(&batch)?);
        }
    }

    Ok(())
}
