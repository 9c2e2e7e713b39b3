use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{LoreService, Result};
use lore_storage::{
	outbox::{OutboxFamily, OutboxOp},
	queries,
};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReindexReport {
	pub entries_enqueued: u64,
	pub attachments_enqueued: u64,
}

impl LoreService {
	/// Enqueues an upsert for every entry and parsed attachment, for example after the index was
	/// wiped or its embedding model changed.
	pub async fn reindex_all(&self) -> Result<ReindexReport> {
		let now = OffsetDateTime::now_utc();
		let mut tx = self.db.pool.begin().await?;
		let mut report = ReindexReport::default();

		for entry_id in queries::list_entry_ids(&mut *tx).await? {
			if crate::enqueue_entry(&mut tx, entry_id, OutboxOp::Upsert, None, now).await? {
				report.entries_enqueued += 1;
			}
		}
		for (attachment_id, entry_id) in queries::list_parsed_attachments(&mut *tx).await? {
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
			entries = report.entries_enqueued,
			attachments = report.attachments_enqueued,
			"Reindex enqueued."
		);

		Ok(report)
	}
}
