//! # Analysis Worker
//!
//! Reads one JSON request per stdin line and writes one JSON response per stdout
//! line until input closes or the worker has been idle for the configured timeout.

use analysis_worker::logging::init_tracing_for_environment;
use analysis_worker::{
    CellSetDatasetLoader, CellSetStore, ConfigManager, FileCellSetStore, JsonLinesQueue,
    RWorkerClient, TaskDispatcher, WorkerLoop,
};
use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "analysis-worker")]
#[command(about = "Run single-cell analysis requests against the compute backend")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Configuration directory (default: config)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    /// Environment overlay to load (default: WORKER_ENV, APP_ENV or development)
    #[arg(short, long)]
    environment: Option<String>,

    /// Print the effective configuration with secrets masked and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let environment = cli
        .environment
        .unwrap_or_else(ConfigManager::detect_environment);

    init_tracing_for_environment(&environment);

    let manager = ConfigManager::load_from_directory_with_env(cli.config_dir, &environment)
        .context("failed to load worker configuration")?;

    if cli.print_config {
        println!("{}", serde_json::to_string_pretty(&manager.debug_config())?);
        return Ok(());
    }

    let config = Arc::new(manager.config().clone());
    let store: Arc<dyn CellSetStore> =
        Arc::new(FileCellSetStore::new(&config.cell_sets.directory));
    let client = RWorkerClient::new(&config).context("failed to create R worker client")?;
    let dispatcher = TaskDispatcher::new(config.clone(), client, store.clone());

    let mut worker = WorkerLoop::new(
        dispatcher,
        Arc::new(JsonLinesQueue::stdio()),
        Arc::new(CellSetDatasetLoader::new(store)),
    );

    info!(
        environment = %manager.environment(),
        experiment_id = ?config.worker.experiment_id,
        "Analysis worker starting"
    );
    let reason = worker.run().await?;
    info!(reason = ?reason, stats = ?worker.stats(), "Analysis worker exiting");

    Ok(())
}
