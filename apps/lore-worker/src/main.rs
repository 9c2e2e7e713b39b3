use clap::Parser;

use lore_worker::Args;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	lore_worker::run(Args::parse()).await
}
