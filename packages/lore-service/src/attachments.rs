use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Error, LoreService, Result};
use lore_storage::{
	models::Attachment,
	outbox::{OutboxFamily, OutboxOp},
	queries,
};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AddAttachmentRequest {
	pub entry_id: Uuid,
	pub file_name: String,
	pub file_path: String,
	pub content_type: String,
	pub size_bytes: i64,
}

impl LoreService {
	/// Records an uploaded file and enqueues it for text extraction. Indexing follows once the
	/// parse succeeds.
	pub async fn add_attachment(&self, req: AddAttachmentRequest) -> Result<Attachment> {
		let now = OffsetDateTime::now_utc();
		let attachment = Attachment {
			attachment_id: Uuid::new_v4(),
			entry_id: req.entry_id,
			file_name: crate::required("file_name", &req.file_name)?,
			file_path: crate::required("file_path", &req.file_path)?,
			content_type: req.content_type.trim().to_string(),
			size_bytes: req.size_bytes.max(0),
			parse_status: "pending".to_string(),
			parsed_text: None,
			parse_error: None,
			created_at: now,
			updated_at: now,
		};
		let mut tx = self.db.pool.begin().await?;

		if queries::fetch_entry(&mut *tx, attachment.entry_id).await?.is_none() {
			return Err(Error::NotFound { message: format!("Entry {}.", attachment.entry_id) });
		}

		queries::insert_attachment(&mut *tx, &attachment).await?;
		crate::enqueue_attachment(
			&mut tx,
			OutboxFamily::AttachmentParse,
			attachment.attachment_id,
			attachment.entry_id,
			OutboxOp::Parse,
			Some(now),
			now,
		)
		.await?;

		tx.commit().await?;

		Ok(attachment)
	}

	/// Returns `false` when the attachment did not exist.
	pub async fn delete_attachment(&self, attachment_id: Uuid) -> Result<bool> {
		let now = OffsetDateTime::now_utc();
		let mut tx = self.db.pool.begin().await?;
		let Some(entry_id) = queries::delete_attachment(&mut *tx, attachment_id).await? else {
			tx.commit().await?;

			return Ok(false);
		};

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

		tx.commit().await?;

		Ok(true)
	}
}
