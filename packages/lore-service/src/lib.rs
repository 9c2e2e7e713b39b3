//! Producer side of the indexing pipeline.
//!
//! Every mutation here writes its outbox rows in the same transaction as the data change, so a
//! committed change always has a pending index event and a rolled-back one never does.

pub mod admin;
pub mod attachments;
pub mod entries;
pub mod entry_types;

mod error;

pub use admin::ReindexReport;
pub use attachments::AddAttachmentRequest;
pub use entries::{CreateEntryRequest, UpdateEntryRequest};
pub use entry_types::{CreateEntryTypeRequest, FlagChangeReport};
pub use error::{Error, Result};

use sqlx::PgConnection;
use time::OffsetDateTime;
use uuid::Uuid;

use lore_storage::{
	db::Db,
	outbox::{self, NewEvent, OutboxFamily, OutboxOp},
};

pub struct LoreService {
	pub db: Db,
}
impl LoreService {
	pub fn new(db: Db) -> Self {
		Self { db }
	}
}

pub(crate) async fn enqueue_entry(
	conn: &mut PgConnection,
	entry_id: Uuid,
	op: OutboxOp,
	subject_updated_at: Option<OffsetDateTime>,
	now: OffsetDateTime,
) -> Result<bool> {
	let event = NewEvent { subject_id: entry_id, secondary_id: None, op, subject_updated_at };

	Ok(outbox::enqueue(&mut *conn, OutboxFamily::EntryIndex, event, now).await?)
}

pub(crate) async fn enqueue_attachment(
	conn: &mut PgConnection,
	family: OutboxFamily,
	attachment_id: Uuid,
	entry_id: Uuid,
	op: OutboxOp,
	subject_updated_at: Option<OffsetDateTime>,
	now: OffsetDateTime,
) -> Result<bool> {
	let event = NewEvent {
		subject_id: attachment_id,
		secondary_id: Some(entry_id),
		op,
		subject_updated_at,
	};

	Ok(outbox::enqueue(&mut *conn, family, event, now).await?)
}

pub(crate) fn required(field: &str, value: &str) -> Result<String> {
	let trimmed = value.trim();

	if trimmed.is_empty() {
		return Err(Error::InvalidRequest { message: format!("{field} must be non-empty.") });
	}

	Ok(trimmed.to_string())
}
