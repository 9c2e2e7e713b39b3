//! Polling loop for one outbox family.
//!
//! Each family runs as its own task: claim a batch, run every row's handler in a spawned task, and
//! resolve the row under the lease it was claimed with. A failed or panicking handler only ever
//! costs that row an attempt.

use std::{sync::Arc, time::Duration as StdDuration};

use time::{Duration, OffsetDateTime};
use tokio::{sync::watch, time as tokio_time};

use lore_config::{Parser, WorkerConfig};
use lore_domain::retry::{backoff_for_attempt, sanitize_error};
use lore_index::{ErrorKind, IndexResult, Indexer};
use lore_storage::{
	db::Db,
	outbox::{self, ClaimedEvent, OutboxFamily, RetryOutcome},
	queries,
};

pub struct WorkerState {
	pub db: Db,
	pub indexer: Indexer,
	pub parser: Parser,
}

/// What a handler decided for its row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
	/// Delete the row.
	Done,
	Retry { kind: ErrorKind, error: String },
	Dead { kind: ErrorKind, error: String },
	/// The handler already resolved the row inside its own transaction.
	Resolved,
}
impl Outcome {
	pub fn failure(kind: ErrorKind, error: impl Into<String>) -> Self {
		let error = error.into();

		if kind.is_retryable() { Self::Retry { kind, error } } else { Self::Dead { kind, error } }
	}

	pub fn from_index(result: IndexResult) -> Self {
		if result.ok {
			return Self::Done;
		}

		let kind = result.error_kind.unwrap_or(ErrorKind::Unknown);
		let error = result.detail.unwrap_or_else(|| "Index operation failed.".to_string());

		if result.retryable { Self::Retry { kind, error } } else { Self::Dead { kind, error } }
	}
}

pub async fn run_family(
	state: Arc<WorkerState>,
	family: OutboxFamily,
	cfg: WorkerConfig,
	mut shutdown: watch::Receiver<bool>,
) {
	let poll_interval = StdDuration::from_millis(cfg.poll_interval_ms);

	loop {
		if *shutdown.borrow() {
			break;
		}
		if !cfg.enabled {
			idle(&mut shutdown, poll_interval).await;

			continue;
		}

		match process_batch(&state, family, &cfg).await {
			Ok(0) => idle(&mut shutdown, poll_interval).await,
			Ok(count) => tracing::debug!(family = family.as_str(), count, "Processed outbox batch."),
			Err(err) => {
				tracing::error!(error = %err, family = family.as_str(), "Outbox claim failed.");

				idle(&mut shutdown, poll_interval).await;
			},
		}
	}

	tracing::info!(family = family.as_str(), "Outbox worker stopped.");
}

/// Claims one batch and resolves every row in it. Each row's lease is renewed right before its
/// handler runs. Returns the number of rows claimed.
pub async fn process_batch(
	state: &Arc<WorkerState>,
	family: OutboxFamily,
	cfg: &WorkerConfig,
) -> lore_storage::Result<usize> {
	let lease_ttl = Duration::seconds(i64::try_from(cfg.lock_ttl_sec).unwrap_or(i64::MAX));
	let claimed = outbox::claim_batch(
		&state.db.pool,
		family,
		&cfg.worker_id,
		cfg.batch_size,
		lease_ttl,
		OffsetDateTime::now_utc(),
	)
	.await?;
	let count = claimed.len();

	for mut claimed in claimed {
		match outbox::renew_lease(
			&state.db.pool,
			family,
			&claimed.claim,
			OffsetDateTime::now_utc(),
		)
		.await
		{
			Ok(claim) => claimed.claim = claim,
			Err(err) => {
				tracing::warn!(
					error = %err,
					family = family.as_str(),
					outbox_id = %claimed.event.id,
					"Lease could not be renewed. Skipping row."
				);

				continue;
			},
		}

		let task_state = state.clone();
		let task_event = claimed.clone();
		let handled =
			tokio::spawn(async move { handle(&task_state, family, &task_event).await }).await;
		let outcome = match handled {
			Ok(Ok(outcome)) => outcome,
			Ok(Err(err)) => Outcome::Retry { kind: ErrorKind::Unknown, error: format!("{err:#}") },
			Err(err) =>
				Outcome::Retry { kind: ErrorKind::Unknown, error: format!("Handler panicked: {err}") },
		};

		resolve(state, family, cfg, &claimed, outcome).await;
	}

	Ok(count)
}

async fn handle(
	state: &WorkerState,
	family: OutboxFamily,
	claimed: &ClaimedEvent,
) -> color_eyre::Result<Outcome> {
	match family {
		OutboxFamily::EntryIndex | OutboxFamily::AttachmentIndex =>
			crate::index::handle(state, family, claimed).await,
		OutboxFamily::AttachmentParse => crate::parse::handle(state, claimed).await,
	}
}

async fn resolve(
	state: &WorkerState,
	family: OutboxFamily,
	cfg: &WorkerConfig,
	claimed: &ClaimedEvent,
	outcome: Outcome,
) {
	let now = OffsetDateTime::now_utc();
	let event = &claimed.event;
	let pool = &state.db.pool;
	let result = match outcome {
		Outcome::Resolved => Ok(()),
		Outcome::Done => outbox::mark_succeeded(pool, family, &claimed.claim).await.map(|()| {
			tracing::debug!(
				family = family.as_str(),
				outbox_id = %event.id,
				subject_id = %event.subject_id,
				"Outbox row succeeded."
			);
		}),
		Outcome::Retry { kind, error } => {
			let error = sanitize_error(&format!("{kind}: {error}"));
			let delay = backoff_for_attempt(event.attempts, cfg.base_backoff_ms, cfg.max_backoff_ms);

			match outbox::mark_retry(
				pool,
				family,
				&claimed.claim,
				&error,
				now + delay,
				cfg.max_attempts,
				now,
			)
			.await
			{
				Ok(RetryOutcome::Rescheduled { attempts, available_at }) => {
					tracing::warn!(
						family = family.as_str(),
						outbox_id = %event.id,
						attempts,
						available_at = %available_at,
						error = %error,
						"Outbox row failed. Retrying."
					);

					Ok(())
				},
				Ok(RetryOutcome::DeadLettered { attempts }) => {
					tracing::warn!(
						family = family.as_str(),
						outbox_id = %event.id,
						attempts,
						error = %error,
						"Outbox row exhausted its attempts. Dead-lettered."
					);

					record_dead(state, family, claimed, &error, now).await
				},
				Err(err) => Err(err),
			}
		},
		Outcome::Dead { kind, error } => {
			let error = sanitize_error(&format!("{kind}: {error}"));

			match outbox::mark_dead(pool, family, &claimed.claim, &error, now).await {
				Ok(attempts) => {
					tracing::warn!(
						family = family.as_str(),
						outbox_id = %event.id,
						attempts,
						error = %error,
						"Outbox row failed permanently. Dead-lettered."
					);

					record_dead(state, family, claimed, &error, now).await
				},
				Err(err) => Err(err),
			}
		},
	};

	match result {
		Ok(()) => {},
		Err(lore_storage::Error::LeaseLost { .. }) => {
			tracing::warn!(
				family = family.as_str(),
				outbox_id = %event.id,
				worker_id = %claimed.claim.worker_id,
				"Lease lost before resolution. Abandoning row."
			);
		},
		Err(err) => {
			tracing::error!(
				error = %err,
				family = family.as_str(),
				outbox_id = %event.id,
				"Failed to resolve outbox row."
			);
		},
	}
}

/// A dead parse row leaves its attachment marked failed so the failure is visible on the record.
async fn record_dead(
	state: &WorkerState,
	family: OutboxFamily,
	claimed: &ClaimedEvent,
	error: &str,
	now: OffsetDateTime,
) -> lore_storage::Result<()> {
	if family == OutboxFamily::AttachmentParse {
		queries::record_parse_failure(&state.db.pool, claimed.event.subject_id, error, now).await?;
	}

	Ok(())
}

async fn idle(shutdown: &mut watch::Receiver<bool>, poll_interval: StdDuration) {
	tokio::select! {
		_ = tokio_time::sleep(poll_interval) => {},
		_ = shutdown.changed() => {},
	}
}
