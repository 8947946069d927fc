//! # Doc Relay CLI (`docrelay`)
//!
//! The `docrelay` binary drives the ingestion relay: it initializes the
//! status ledger, runs queue consumer cycles, fires manual triggers, and
//! inspects per-file indexing status.
//!
//! ## Usage
//!
//! ```bash
//! docrelay --config ./config/relay.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docrelay init` | Create the ledger database and run schema migrations |
//! | `docrelay consume` | Poll one batch from the work queue and process it |
//! | `docrelay process --blob-url <url> --action <add\|remove\|removeall>` | Manual trigger for one blob |
//! | `docrelay ingest <local\|datalake>` | Bulk-ingest every (changed) file a source yields |
//! | `docrelay status <sourcefile>` | Show the ledger rows for a source file |

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use doc_relay::config::{load_config, Config};
use doc_relay::consumer::QueueConsumer;
use doc_relay::event::DocumentAction;
use doc_relay::indexer::create_indexer;
use doc_relay::ledger::Ledger;
use doc_relay::migrate::run_migrations;
use doc_relay::queue::RestQueueClient;
use doc_relay::source::FileSource;
use doc_relay::source_datalake::DataLakeSource;
use doc_relay::source_local::LocalSource;
use doc_relay::worker::{IngestRequest, IngestionWorker};

/// Doc Relay — queue-driven document ingestion with durable per-file
/// status tracking and dead-letter failure routing.
#[derive(Parser)]
#[command(
    name = "docrelay",
    about = "Queue-driven document ingestion relay",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/relay.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the ledger database schema. Idempotent.
    Init,

    /// Poll one batch from the work queue: dispatch each message, delete
    /// successes, dead-letter failures. Exits non-zero if any message in
    /// the batch failed.
    Consume,

    /// Manually trigger processing of one blob, bypassing the queue.
    Process {
        /// Full URL of the blob inside the configured container.
        #[arg(long)]
        blob_url: String,

        /// add, remove, or removeall.
        #[arg(long)]
        action: String,

        /// Optional category recorded with the ledger row.
        #[arg(long)]
        category: Option<String>,
    },

    /// Bulk-ingest from an enumerating source: `local` or `datalake`.
    Ingest {
        source: String,

        #[arg(long)]
        category: Option<String>,
    },

    /// Show ledger rows matching a source file.
    Status { sourcefile: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let config = Arc::new(load_config(&cli.config)?);

    match cli.command {
        Commands::Init => {
            let ledger = Ledger::connect(&config.ledger.path).await?;
            run_migrations(ledger.pool()).await?;
            println!("ledger initialized at {}", config.ledger.path.display());
        }

        Commands::Consume => {
            let queue_config = config
                .queue
                .clone()
                .context("queue is not configured; add a [queue] section")?;
            let (work, deadletter) = RestQueueClient::pair_from_config(&queue_config);
            let consumer = QueueConsumer::new(
                Arc::new(work),
                Arc::new(deadletter),
                worker_from_config(&config).await?,
                Some(Ledger::connect(&config.ledger.path).await?),
                queue_config.batch_size,
                Duration::from_secs(queue_config.visibility_timeout_secs),
            );

            let summary = consumer.run_cycle().await?;
            println!("consume cycle");
            println!("  succeeded: {}", summary.succeeded.len());
            println!("  failed: {}", summary.failed.len());
            println!("ok");
        }

        Commands::Process {
            blob_url,
            action,
            category,
        } => {
            let Some(action) = DocumentAction::parse(&action) else {
                bail!("Unknown action: '{}'. Must be add, remove, or removeall.", action);
            };
            let worker = worker_from_config(&config).await?;
            worker
                .handle(&IngestRequest {
                    action,
                    blob_url: blob_url.clone(),
                    category,
                })
                .await?;
            println!("processed {} ({})", blob_url, action.as_str());
        }

        Commands::Ingest { source, category } => {
            let worker = worker_from_config(&config).await?;
            let source: Box<dyn FileSource> = match source.as_str() {
                "local" => {
                    let local_config = config
                        .storage
                        .local
                        .as_ref()
                        .context("local source is not configured")?;
                    Box::new(LocalSource::new(local_config)?)
                }
                "datalake" => {
                    let datalake_config = config
                        .storage
                        .datalake
                        .clone()
                        .context("datalake source is not configured")?;
                    Box::new(DataLakeSource::new(datalake_config, config.scratch.dir.clone()))
                }
                other => bail!("Unknown source: '{}'. Available: local, datalake", other),
            };
            let processed = worker.ingest_source(source.as_ref(), category.as_deref()).await?;
            println!("ingested {} files", processed);
        }

        Commands::Status { sourcefile } => {
            let ledger = Ledger::connect(&config.ledger.path).await?;
            let entries = ledger.find_by_sourcefile(&sourcefile).await?;
            if entries.is_empty() {
                println!("no ledger rows for {}", sourcefile);
            }
            for entry in entries {
                println!("{}", entry.id);
                println!("  status: {}", entry.current_status.as_str());
                println!("  filename: {}", entry.filename);
                if let Some(ref category) = entry.category {
                    println!("  category: {}", category);
                }
                println!("  pages: {}", entry.pages);
                println!("  chunks: {}", entry.chunk_ids.len());
                println!("  last modified: {}", entry.last_modified.to_rfc3339());
                println!("  history: {} entries", entry.history.len());
            }
        }
    }

    Ok(())
}

async fn worker_from_config(config: &Arc<Config>) -> Result<IngestionWorker> {
    let ledger = Ledger::connect(&config.ledger.path).await?;
    run_migrations(ledger.pool()).await?;
    let indexer = create_indexer(&config.indexer)?;
    Ok(IngestionWorker::new(Arc::clone(config), ledger, indexer))
}
