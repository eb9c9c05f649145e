//! Worker CLI: enqueue import jobs, import single files, drain the shared
//! queue, run partition-ordered imports, or drive the scale test.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use jsonstore_import::{logging, ImportConfig, ImportExecutor, StoreType};

#[derive(Parser)]
#[command(name = "jsonstore-import", version, about = "Distributed bulk importer worker")]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Enqueue every file under a source folder as work items
    Enqueue {
        /// Source backend: local, s3, http
        #[arg(long)]
        store: StoreType,
        /// Folder to enumerate
        #[arg(long)]
        folder: String,
        /// Treat entries as partition folders with ordered file sequences
        #[arg(long)]
        partitioned: bool,
    },
    /// Import one file straight into the sink, without queue tracking
    Import {
        /// Source backend: local, s3, http
        #[arg(long)]
        store: StoreType,
        /// File location to import
        #[arg(long)]
        location: String,
    },
    /// Claim and import unpartitioned queue items until the queue is empty
    DrainQueue,
    /// Claim partitions and ingest their file sequences concurrently
    PartitionImport,
    /// Bulk-write synthetic template batches until interrupted
    ScaleTest,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_logging();
    let cli = Cli::parse();
    let config =
        ImportConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, shutting down");
                cancel.cancel();
            }
        }
    });

    let executor = ImportExecutor::new(config, cancel)
        .await
        .context("failed to initialize worker")?;

    match cli.command {
        Command::Enqueue {
            store,
            folder,
            partitioned,
        } => {
            let inserted = executor.enqueue_folder(store, &folder, partitioned).await?;
            info!(inserted, "enqueue finished");
        }
        Command::Import { store, location } => {
            let outcome = executor.import_location(store, &location).await?;
            if outcome.is_error() {
                warn!(
                    received = outcome.docs_received,
                    imported = outcome.docs_imported,
                    "import finished degraded"
                );
            }
        }
        Command::DrainQueue => executor.drain_queue().await?,
        Command::PartitionImport => executor.run_partition_import().await?,
        Command::ScaleTest => executor.run_scale_test().await?,
    }

    Ok(())
}
