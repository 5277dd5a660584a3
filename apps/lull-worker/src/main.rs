use clap::Parser;

use lull_worker::Args;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	lull_worker::run(Args::parse()).await
}
