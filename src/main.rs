use anyhow::Context;
use chrono::Local;
use clap::Parser;
use log::{error, info};
use std::path::PathBuf;
use std::sync::Arc;

use metro_batch::batch::BatchService;
use metro_batch::config::PipelineConfig;
use metro_batch::storage::{self, FileStore, LocalFileStore};

/// Imports the uploads of every queued entry of a batch and runs the
/// simulation for each, in queue order.
#[derive(Parser, Debug)]
#[command(name = "metro-batch", version)]
struct Cli {
    /// Id of the batch to run.
    batch_id: i32,

    /// Environment file to load instead of `./.env`.
    #[arg(long)]
    env_file: Option<PathBuf>,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = init_logging() {
        eprintln!("could not set up logging: {:#}", e);
    }
    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        eprintln!("metro-batch: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging() -> anyhow::Result<()> {
    let ts = Local::now().format("%Y%m%d-%H%M%S").to_string();
    let log_dir = PathBuf::from("logs");
    std::fs::create_dir_all(&log_dir)?;
    let log_path = log_dir.join(format!("batch-{}.log", ts));
    let log_file = std::fs::File::create(&log_path)
        .with_context(|| format!("creating {}", log_path.display()))?;
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Warn)
        .filter_module("metro_batch", log::LevelFilter::Info)
        .filter_module("sqlx", log::LevelFilter::Error)
        .filter_module("sea_orm", log::LevelFilter::Error)
        .parse_default_env()
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .init();
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = PipelineConfig::from_env(cli.env_file.as_deref());
    let db = storage::establish_connection(&config.database_url, config.max_connections)
        .await
        .with_context(|| format!("connecting to {}", config.database_url))?;
    let store: Arc<dyn FileStore> = Arc::new(LocalFileStore::new(config.upload_dir.clone()));

    let service = BatchService::new(Arc::new(db), Arc::new(config), store);
    let report = service
        .run_batch(cli.batch_id)
        .await
        .with_context(|| format!("batch {}", cli.batch_id))?;
    info!(
        "batch {}: {} entries, {} executed, {} failed",
        report.batch_id,
        report.entries.len(),
        report.executed(),
        report.failed()
    );
    println!("{}", serde_json::to_string(&report)?);
    Ok(())
}
