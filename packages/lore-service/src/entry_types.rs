use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Error, LoreService, Result};
use lore_storage::{
	models::EntryType,
	outbox::{OutboxFamily, OutboxOp},
	queries,
};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateEntryTypeRequest {
	pub code: String,
	pub name: String,
	pub graph_enabled: bool,
	pub ai_enabled: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagChangeReport {
	pub entries_enqueued: u64,
	pub attachments_enqueued: u64,
}

impl LoreService {
	pub async fn create_entry_type(&self, req: CreateEntryTypeRequest) -> Result<EntryType> {
		let now = OffsetDateTime::now_utc();
		let entry_type = EntryType {
			type_id: Uuid::new_v4(),
			code: crate::required("code", &req.code)?,
			name: crate::required("name", &req.name)?,
			graph_enabled: req.graph_enabled,
			ai_enabled: req.ai_enabled,
			created_at: now,
			updated_at: now,
		};

		queries::insert_entry_type(&self.db.pool, &entry_type).await?;

		Ok(entry_type)
	}

	/// Changes the type's flags and re-enqueues every document of that type.
	///
	/// The worker re-reads each document, so turning `ai_enabled` off retracts them from the index
	/// and turning it back on restores them.
	pub async fn set_entry_type_flags(
		&self,
		type_id: Uuid,
		graph_enabled: bool,
		ai_enabled: bool,
	) -> Result<FlagChangeReport> {
		let now = OffsetDateTime::now_utc();
		let mut tx = self.db.pool.begin().await?;
		let current = sqlx::query_as::<_, EntryType>(
			"SELECT * FROM entry_types WHERE type_id = $1 FOR UPDATE",
		)
		.bind(type_id)
		.fetch_optional(&mut *tx)
		.await?
		.ok_or_else(|| Error::NotFound { message: format!("Entry type {type_id}.") })?;

		if current.graph_enabled == graph_enabled && current.ai_enabled == ai_enabled {
			tx.commit().await?;

			return Ok(FlagChangeReport::default());
		}

		queries::update_entry_type_flags(&mut *tx, type_id, graph_enabled, ai_enabled, now).await?;

		let mut report = FlagChangeReport::default();

		for entry_id in queries::list_entry_ids_by_type(&mut *tx, type_id).await? {
			if crate::enqueue_entry(&mut tx, entry_id, OutboxOp::Upsert, None, now).await? {
				report.entries_enqueued += 1;
			}
		}
		for (attachment_id, entry_id) in
			queries::list_parsed_attachments_by_type(&mut *tx, type_id).await?
		{
			if crate::enqueue_attachment(
				&mut tx,
				OutboxFamily::AttachmentIndex,
				attachment_id,
				entry_id,
				OutboxOp::Upsert,
				None,
				now,
			)
			.await?
			{
				report.attachments_enqueued += 1;
			}
		}

		tx.commit().await?;

		tracing::info!(
			type_id = %type_id,
			graph_enabled,
			ai_enabled,
			entries = report.entries_enqueued,
			attachments = report.attachments_enqueued,
			"Entry type flags changed."
		);

		Ok(report)
	}
}
