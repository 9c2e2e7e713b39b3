use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Error, LoreService, Result};
use lore_storage::{
	models::Entry,
	outbox::{OutboxFamily, OutboxOp},
	queries,
};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateEntryRequest {
	pub type_id: Uuid,
	pub title: String,
	pub summary: Option<String>,
	pub content: String,
	#[serde(default)]
	pub tags: Vec<String>,
}

/// Fields left as `None` keep their current value.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct UpdateEntryRequest {
	pub type_id: Option<Uuid>,
	pub title: Option<String>,
	pub summary: Option<Option<String>>,
	pub content: Option<String>,
	pub tags: Option<Vec<String>>,
}

impl LoreService {
	pub async fn create_entry(&self, req: CreateEntryRequest) -> Result<Entry> {
		let now = OffsetDateTime::now_utc();
		let entry = Entry {
			entry_id: Uuid::new_v4(),
			type_id: req.type_id,
			title: crate::required("title", &req.title)?,
			summary: req.summary,
			content: req.content,
			created_at: now,
			updated_at: now,
		};
		let mut tx = self.db.pool.begin().await?;

		if queries::fetch_entry_type(&mut *tx, entry.type_id).await?.is_none() {
			return Err(Error::NotFound { message: format!("Entry type {}.", entry.type_id) });
		}

		queries::insert_entry(&mut *tx, &entry).await?;
		queries::set_entry_tags(&mut tx, entry.entry_id, &req.tags).await?;
		crate::enqueue_entry(&mut tx, entry.entry_id, OutboxOp::Upsert, Some(now), now).await?;

		tx.commit().await?;

		Ok(entry)
	}

	/// Updates the entry and re-enqueues it together with its parsed attachments, whose index
	/// documents carry the entry's title and tags.
	pub async fn update_entry(&self, entry_id: Uuid, req: UpdateEntryRequest) -> Result<Entry> {
		let now = OffsetDateTime::now_utc();
		let mut tx = self.db.pool.begin().await?;
		let mut entry =
			sqlx::query_as::<_, Entry>("SELECT * FROM entries WHERE entry_id = $1 FOR UPDATE")
				.bind(entry_id)
				.fetch_optional(&mut *tx)
				.await?
				.ok_or_else(|| Error::NotFound { message: format!("Entry {entry_id}.") })?;

		if let Some(type_id) = req.type_id {
			if queries::fetch_entry_type(&mut *tx, type_id).await?.is_none() {
				return Err(Error::NotFound { message: format!("Entry type {type_id}.") });
			}

			entry.type_id = type_id;
		}
		if let Some(title) = req.title {
			entry.title = crate::required("title", &title)?;
		}
		if let Some(summary) = req.summary {
			entry.summary = summary;
		}
		if let Some(content) = req.content {
			entry.content = content;
		}

		entry.updated_at = now;

		queries::update_entry(&mut *tx, &entry).await?;

		if let Some(tags) = req.tags {
			queries::set_entry_tags(&mut tx, entry_id, &tags).await?;
		}

		crate::enqueue_entry(&mut tx, entry_id, OutboxOp::Upsert, Some(now), now).await?;

		let attachments = sqlx::query_as::<_, (Uuid, OffsetDateTime)>(
			"\
SELECT attachment_id, updated_at
FROM attachments
WHERE entry_id = $1 AND parse_status = 'parsed'",
		)
		.bind(entry_id)
		.fetch_all(&mut *tx)
		.await?;

		for (attachment_id, updated_at) in attachments {
			crate::enqueue_attachment(
				&mut tx,
				OutboxFamily::AttachmentIndex,
				attachment_id,
				entry_id,
				OutboxOp::Upsert,
				Some(updated_at),
				now,
			)
			.await?;
		}

		tx.commit().await?;

		Ok(entry)
	}

	/// Deletes the entry and its attachments, enqueueing index deletes for all of them.
	///
	/// Returns `false` when the entry did not exist.
	pub async fn delete_entry(&self, entry_id: Uuid) -> Result<bool> {
		let now = OffsetDateTime::now_utc();
		let mut tx = self.db.pool.begin().await?;
		let attachment_ids = queries::list_attachment_ids_by_entry(&mut *tx, entry_id).await?;

		if !queries::delete_entry(&mut *tx, entry_id).await? {
			tx.commit().await?;

			return Ok(false);
		}

		crate::enqueue_entry(&mut tx, entry_id, OutboxOp::Delete, None, now).await?;

		for attachment_id in attachment_ids {
			crate::enqueue_attachment(
				&mut tx,
				OutboxFamily::AttachmentIndex,
				attachment_id,
				entry_id,
				OutboxOp::Delete,
				None,
				now,
			)
			.await?;
		}

		tx.commit().await?;

		Ok(true)
	}
}
