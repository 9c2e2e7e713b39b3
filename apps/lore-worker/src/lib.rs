pub mod payload;
pub mod worker;

mod index;
mod parse;

use std::{path::PathBuf, sync::Arc};

use clap::{Parser, Subcommand};
use time::format_description::well_known::Rfc3339;
use tokio::{signal, sync::watch};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use lore_config::Config;
use lore_index::Indexer;
use lore_storage::{
	db::Db,
	outbox::{self, OutboxFamily},
};
use worker::WorkerState;

#[derive(Debug, Parser)]
#[command(
	version = lore_cli::VERSION,
	rename_all = "kebab",
	styles = lore_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
	#[command(subcommand)]
	pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
	/// Process all outbox families until interrupted.
	Run,
	/// Print dead-lettered rows of one family, newest first.
	DeadLetters {
		#[arg(long)]
		family: OutboxFamily,
		#[arg(long, default_value_t = 20)]
		limit: u32,
	},
	/// Put a dead row back in the queue with a fresh attempt budget.
	Requeue {
		#[arg(long)]
		family: OutboxFamily,
		#[arg(long)]
		id: Uuid,
	},
	/// Print per-status row counts for every family.
	Stats,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = lore_config::load(&args.config)?;
	let filter = EnvFilter::new(config.service.log_level.clone());

	tracing_subscriber::fmt().with_env_filter(filter).init();

	let db = Db::connect(&config.storage.postgres).await?;

	db.ensure_schema().await?;

	match args.command.unwrap_or(Command::Run) {
		Command::Run => run_workers(config, db).await,
		Command::DeadLetters { family, limit } => print_dead_letters(&db, family, limit).await,
		Command::Requeue { family, id } => {
			outbox::requeue_dead(&db.pool, family, id, time::OffsetDateTime::now_utc()).await?;

			println!("Requeued {family} row {id}.");

			Ok(())
		},
		Command::Stats => print_stats(&db).await,
	}
}

async fn run_workers(config: Config, db: Db) -> color_eyre::Result<()> {
	let indexer = Indexer::from_config(&config)?;

	tracing::info!(backend = indexer.backend_name(), "Indexer ready.");

	let state = Arc::new(WorkerState { db, indexer, parser: config.parser.clone() });
	let (shutdown_tx, shutdown_rx) = watch::channel(false);
	let mut tasks = Vec::new();

	for (family, worker_cfg) in [
		(OutboxFamily::EntryIndex, &config.workers.entry_index),
		(OutboxFamily::AttachmentParse, &config.workers.attachment_parse),
		(OutboxFamily::AttachmentIndex, &config.workers.attachment_index),
	] {
		tracing::info!(
			family = family.as_str(),
			worker_id = %worker_cfg.worker_id,
			enabled = worker_cfg.enabled,
			"Starting outbox worker."
		);

		tasks.push(tokio::spawn(worker::run_family(
			state.clone(),
			family,
			worker_cfg.clone(),
			shutdown_rx.clone(),
		)));
	}

	signal::ctrl_c().await?;
	tracing::info!("Shutdown requested. Finishing in-flight batches.");

	let _ = shutdown_tx.send(true);

	for task in tasks {
		if let Err(err) = task.await {
			tracing::error!(error = %err, "Outbox worker task failed.");
		}
	}

	if let Ok(state) = Arc::try_unwrap(state) {
		state.indexer.shutdown();
	}

	Ok(())
}

async fn print_dead_letters(db: &Db, family: OutboxFamily, limit: u32) -> color_eyre::Result<()> {
	let rows = outbox::list_dead(&db.pool, family, limit).await?;

	if rows.is_empty() {
		println!("No dead {family} rows.");

		return Ok(());
	}

	for row in rows {
		println!(
			"{} {} subject={} attempts={} updated_at={} error={}",
			row.id,
			row.op,
			row.subject_id,
			row.attempts,
			row.updated_at.format(&Rfc3339)?,
			row.last_error.as_deref().unwrap_or("-"),
		);
	}

	Ok(())
}

async fn print_stats(db: &Db) -> color_eyre::Result<()> {
	for family in OutboxFamily::ALL {
		let counts = outbox::counts_by_status(&db.pool, family).await?;

		println!(
			"{family}: pending={} processing={} succeeded={} dead={}",
			counts.pending, counts.processing, counts.succeeded, counts.dead
		);
	}

	Ok(())
}
