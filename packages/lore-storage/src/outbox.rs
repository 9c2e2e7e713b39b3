//! Transactional outbox tables.
//!
//! Three families share one column layout. Producers write rows inside their own transaction with
//! [`enqueue`]; workers take rows with [`claim_batch`] and resolve each one exactly once under the
//! lease recorded at claim time. Every resolution is guarded on `(id, status, locked_by,
//! locked_at)`, so a worker whose lease expired and was taken over can never overwrite the newer
//! owner's outcome.

use std::{fmt, str::FromStr};

use sqlx::PgExecutor;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::{Error, Result, models::OutboxEvent};

const EVENT_COLUMNS: &str = "\
id,
	subject_id,
	secondary_id,
	op,
	subject_updated_at,
	status,
	attempts,
	available_at,
	locked_at,
	locked_by,
	last_error,
	created_at,
	updated_at";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OutboxFamily {
	EntryIndex,
	AttachmentParse,
	AttachmentIndex,
}
impl OutboxFamily {
	pub const ALL: [Self; 3] = [Self::EntryIndex, Self::AttachmentParse, Self::AttachmentIndex];

	pub fn as_str(self) -> &'static str {
		match self {
			Self::EntryIndex => "entry_index",
			Self::AttachmentParse => "attachment_parse",
			Self::AttachmentIndex => "attachment_index",
		}
	}

	pub fn table(self) -> &'static str {
		match self {
			Self::EntryIndex => "entry_index_outbox",
			Self::AttachmentParse => "attachment_parse_outbox",
			Self::AttachmentIndex => "attachment_index_outbox",
		}
	}

	pub fn accepts(self, op: OutboxOp) -> bool {
		match self {
			Self::AttachmentParse => op == OutboxOp::Parse,
			Self::EntryIndex | Self::AttachmentIndex => op != OutboxOp::Parse,
		}
	}
}
impl fmt::Display for OutboxFamily {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
impl FromStr for OutboxFamily {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self> {
		match s.trim().replace('-', "_").as_str() {
			"entry_index" => Ok(Self::EntryIndex),
			"attachment_parse" => Ok(Self::AttachmentParse),
			"attachment_index" => Ok(Self::AttachmentIndex),
			other => Err(Error::InvalidArgument(format!("Unknown outbox family: {other}."))),
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutboxOp {
	Upsert,
	Delete,
	Parse,
}
impl OutboxOp {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Upsert => "upsert",
			Self::Delete => "delete",
			Self::Parse => "parse",
		}
	}
}
impl FromStr for OutboxOp {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self> {
		match s {
			"upsert" => Ok(Self::Upsert),
			"delete" => Ok(Self::Delete),
			"parse" => Ok(Self::Parse),
			other => Err(Error::InvalidArgument(format!("Unknown outbox op: {other}."))),
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutboxStatus {
	Pending,
	Processing,
	Succeeded,
	Dead,
}
impl OutboxStatus {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Pending => "pending",
			Self::Processing => "processing",
			Self::Succeeded => "succeeded",
			Self::Dead => "dead",
		}
	}
}
impl FromStr for OutboxStatus {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self> {
		match s {
			"pending" => Ok(Self::Pending),
			"processing" => Ok(Self::Processing),
			"succeeded" => Ok(Self::Succeeded),
			"dead" => Ok(Self::Dead),
			other => Err(Error::InvalidArgument(format!("Unknown outbox status: {other}."))),
		}
	}
}

/// Lease token handed out by [`claim_batch`]. Resolutions only apply while the row still carries
/// exactly this owner and lock timestamp.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Claim {
	pub id: Uuid,
	pub worker_id: String,
	pub locked_at: OffsetDateTime,
}

#[derive(Clone, Debug)]
pub struct ClaimedEvent {
	pub event: OutboxEvent,
	pub claim: Claim,
}
impl ClaimedEvent {
	pub fn op(&self) -> Result<OutboxOp> {
		self.event.op.parse()
	}
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RetryOutcome {
	Rescheduled { attempts: i32, available_at: OffsetDateTime },
	DeadLettered { attempts: i32 },
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StatusCounts {
	pub pending: i64,
	pub processing: i64,
	pub succeeded: i64,
	pub dead: i64,
}

pub struct NewEvent {
	pub subject_id: Uuid,
	pub secondary_id: Option<Uuid>,
	pub op: OutboxOp,
	pub subject_updated_at: Option<OffsetDateTime>,
}

/// Writes a pending row unless one for the same subject and op is already waiting.
///
/// Runs on the caller's executor so the row commits or rolls back with the mutation that caused
/// it. Returns whether a row was inserted.
pub async fn enqueue<'e, E>(
	executor: E,
	family: OutboxFamily,
	event: NewEvent,
	now: OffsetDateTime,
) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	if !family.accepts(event.op) {
		return Err(Error::InvalidArgument(format!(
			"Op {} is not valid for the {family} outbox.",
			event.op.as_str()
		)));
	}

	let table = family.table();
	let sql = format!(
		"\
INSERT INTO {table} (
	id,
	subject_id,
	secondary_id,
	op,
	subject_updated_at,
	status,
	attempts,
	available_at,
	created_at,
	updated_at
)
SELECT $1, $2, $3, $4, $5, 'pending', 0, $6, $6, $6
WHERE NOT EXISTS (
	SELECT 1
	FROM {table}
	WHERE subject_id = $2 AND op = $4 AND status = 'pending'
)"
	);
	let result = sqlx::query(&sql)
		.bind(Uuid::new_v4())
		.bind(event.subject_id)
		.bind(event.secondary_id)
		.bind(event.op.as_str())
		.bind(event.subject_updated_at)
		.bind(now)
		.execute(executor)
		.await?;

	Ok(result.rows_affected() > 0)
}

/// Atomically takes up to `batch_size` due rows: pending rows whose `available_at` has passed,
/// plus processing rows whose lease is older than `lease_ttl`. Concurrent callers skip each
/// other's locked rows instead of blocking.
pub async fn claim_batch<'e, E>(
	executor: E,
	family: OutboxFamily,
	worker_id: &str,
	batch_size: u32,
	lease_ttl: Duration,
	now: OffsetDateTime,
) -> Result<Vec<ClaimedEvent>>
where
	E: PgExecutor<'e>,
{
	let table = family.table();
	let sql = format!(
		"\
WITH due AS (
	SELECT id
	FROM {table}
	WHERE (status = 'pending' AND available_at <= $1)
		OR (status = 'processing' AND locked_at < $2)
	ORDER BY available_at ASC
	LIMIT $3
	FOR UPDATE SKIP LOCKED
)
UPDATE {table} AS o
SET status = 'processing',
	locked_at = $1,
	locked_by = $4,
	updated_at = $1
FROM due
WHERE o.id = due.id
RETURNING o.*"
	);
	let mut rows = sqlx::query_as::<_, OutboxEvent>(&sql)
		.bind(now)
		.bind(now - lease_ttl)
		.bind(i64::from(batch_size))
		.bind(worker_id)
		.fetch_all(executor)
		.await?;

	rows.sort_by_key(|row| (row.available_at, row.created_at));

	rows.into_iter()
		.map(|event| {
			let locked_at = event.locked_at.ok_or_else(|| {
				Error::InvalidArgument(format!("Claimed row {} has no lock timestamp.", event.id))
			})?;
			let claim = Claim { id: event.id, worker_id: worker_id.to_string(), locked_at };

			Ok(ClaimedEvent { event, claim })
		})
		.collect()
}

/// Restarts the lease on a claimed row just before its handler runs, so rows later in a batch are
/// not reclaimable while earlier rows are still being worked. Returns the refreshed claim; the old
/// one no longer resolves the row.
pub async fn renew_lease<'e, E>(
	executor: E,
	family: OutboxFamily,
	claim: &Claim,
	now: OffsetDateTime,
) -> Result<Claim>
where
	E: PgExecutor<'e>,
{
	let table = family.table();
	let sql = format!(
		"\
UPDATE {table}
SET locked_at = $4,
	updated_at = $4
WHERE id = $1 AND status = 'processing' AND locked_by = $2 AND locked_at = $3
RETURNING locked_at"
	);
	let locked_at: Option<OffsetDateTime> = sqlx::query_scalar(&sql)
		.bind(claim.id)
		.bind(claim.worker_id.as_str())
		.bind(claim.locked_at)
		.bind(now)
		.fetch_optional(executor)
		.await?;
	let Some(locked_at) = locked_at else {
		return Err(Error::LeaseLost { table, id: claim.id });
	};

	Ok(Claim { locked_at, ..claim.clone() })
}

/// Deletes a successfully processed row.
pub async fn mark_succeeded<'e, E>(executor: E, family: OutboxFamily, claim: &Claim) -> Result<()>
where
	E: PgExecutor<'e>,
{
	let table = family.table();
	let sql = format!(
		"\
DELETE FROM {table}
WHERE id = $1 AND status = 'processing' AND locked_by = $2 AND locked_at = $3"
	);
	let result = sqlx::query(&sql)
		.bind(claim.id)
		.bind(claim.worker_id.as_str())
		.bind(claim.locked_at)
		.execute(executor)
		.await?;

	if result.rows_affected() == 0 {
		return Err(Error::LeaseLost { table, id: claim.id });
	}

	Ok(())
}

/// Records a retryable failure. The row goes back to pending at `next_available_at`, or becomes
/// dead once the incremented attempt count reaches `max_attempts`.
pub async fn mark_retry<'e, E>(
	executor: E,
	family: OutboxFamily,
	claim: &Claim,
	error: &str,
	next_available_at: OffsetDateTime,
	max_attempts: u32,
	now: OffsetDateTime,
) -> Result<RetryOutcome>
where
	E: PgExecutor<'e>,
{
	let table = family.table();
	let sql = format!(
		"\
UPDATE {table}
SET attempts = attempts + 1,
	status = CASE WHEN attempts + 1 >= $4 THEN 'dead' ELSE 'pending' END,
	available_at = CASE WHEN attempts + 1 >= $4 THEN available_at ELSE $5 END,
	locked_at = NULL,
	locked_by = NULL,
	last_error = $6,
	updated_at = $7
WHERE id = $1 AND status = 'processing' AND locked_by = $2 AND locked_at = $3
RETURNING attempts, status, available_at"
	);
	let row: Option<(i32, String, OffsetDateTime)> = sqlx::query_as(&sql)
		.bind(claim.id)
		.bind(claim.worker_id.as_str())
		.bind(claim.locked_at)
		.bind(i32::try_from(max_attempts).unwrap_or(i32::MAX))
		.bind(next_available_at)
		.bind(error)
		.bind(now)
		.fetch_optional(executor)
		.await?;
	let Some((attempts, status, available_at)) = row else {
		return Err(Error::LeaseLost { table, id: claim.id });
	};

	if status == OutboxStatus::Dead.as_str() {
		Ok(RetryOutcome::DeadLettered { attempts })
	} else {
		Ok(RetryOutcome::Rescheduled { attempts, available_at })
	}
}

/// Dead-letters a row immediately. Used for failures that no retry can fix. Returns the final
/// attempt count.
pub async fn mark_dead<'e, E>(
	executor: E,
	family: OutboxFamily,
	claim: &Claim,
	error: &str,
	now: OffsetDateTime,
) -> Result<i32>
where
	E: PgExecutor<'e>,
{
	let table = family.table();
	let sql = format!(
		"\
UPDATE {table}
SET attempts = attempts + 1,
	status = 'dead',
	locked_at = NULL,
	locked_by = NULL,
	last_error = $4,
	updated_at = $5
WHERE id = $1 AND status = 'processing' AND locked_by = $2 AND locked_at = $3
RETURNING attempts"
	);
	let attempts: Option<i32> = sqlx::query_scalar(&sql)
		.bind(claim.id)
		.bind(claim.worker_id.as_str())
		.bind(claim.locked_at)
		.bind(error)
		.bind(now)
		.fetch_optional(executor)
		.await?;

	attempts.ok_or(Error::LeaseLost { table, id: claim.id })
}

pub async fn list_dead<'e, E>(
	executor: E,
	family: OutboxFamily,
	limit: u32,
) -> Result<Vec<OutboxEvent>>
where
	E: PgExecutor<'e>,
{
	let table = family.table();
	let sql = format!(
		"\
SELECT
	{EVENT_COLUMNS}
FROM {table}
WHERE status = 'dead'
ORDER BY updated_at DESC, id
LIMIT $1"
	);
	let rows = sqlx::query_as::<_, OutboxEvent>(&sql)
		.bind(i64::from(limit))
		.fetch_all(executor)
		.await?;

	Ok(rows)
}

/// Puts a dead row back in the queue with a fresh attempt budget.
pub async fn requeue_dead<'e, E>(
	executor: E,
	family: OutboxFamily,
	id: Uuid,
	now: OffsetDateTime,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	let table = family.table();
	let sql = format!(
		"\
UPDATE {table}
SET status = 'pending',
	attempts = 0,
	available_at = $2,
	locked_at = NULL,
	locked_by = NULL,
	last_error = NULL,
	updated_at = $2
WHERE id = $1 AND status = 'dead'"
	);
	let result = sqlx::query(&sql).bind(id).bind(now).execute(executor).await?;

	if result.rows_affected() == 0 {
		return Err(Error::NotFound(format!("No dead {family} row with id {id}.")));
	}

	Ok(())
}

pub async fn counts_by_status<'e, E>(executor: E, family: OutboxFamily) -> Result<StatusCounts>
where
	E: PgExecutor<'e>,
{
	let table = family.table();
	let sql = format!("SELECT status, count(*) FROM {table} GROUP BY status");
	let rows: Vec<(String, i64)> = sqlx::query_as(&sql).fetch_all(executor).await?;
	let mut counts = StatusCounts::default();

	for (status, count) in rows {
		match status.parse::<OutboxStatus>()? {
			OutboxStatus::Pending => counts.pending = count,
			OutboxStatus::Processing => counts.processing = count,
			OutboxStatus::Succeeded => counts.succeeded = count,
			OutboxStatus::Dead => counts.dead = count,
		}
	}

	Ok(counts)
}
