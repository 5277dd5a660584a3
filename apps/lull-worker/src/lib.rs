pub mod worker;

mod error;

pub use error::{Error, Result};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use lull_service::LullService;
use lull_storage::{db::Db, qdrant::QdrantStore};

#[derive(Debug, Parser)]
#[command(
	version = lull_cli::VERSION,
	rename_all = "kebab",
	styles = lull_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: std::path::PathBuf,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = lull_config::load(&args.config)?;
	let filter = EnvFilter::new(config.service.log_level.clone());

	tracing_subscriber::fmt().with_env_filter(filter).init();

	let db = Db::connect(&config.storage.postgres).await?;

	db.ensure_schema(config.storage.qdrant.vector_dim).await?;

	let qdrant = QdrantStore::new(&config.storage.qdrant)?;

	qdrant.ensure_collection().await?;

	let worker_cfg = config.worker.clone();
	let service = LullService::new(config, &db, qdrant);

	tracing::info!(version = lull_cli::VERSION, "Worker started.");

	worker::run_worker(worker::WorkerState { db, service, cfg: worker_cfg }).await?;

	Ok(())
}
