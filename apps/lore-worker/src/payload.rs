//! Rebuilds index documents from current primary-store state.
//!
//! Rows in the outbox only name a subject. Content is always re-read here at processing time, so
//! a stale or collapsed event still indexes the latest version. `None` means the subject should
//! not be in the index at all.

use uuid::Uuid;

use lore_domain::{
	AttachmentSource, DocumentPayload, EntrySource, EntryTypeMeta, TagRef, render_attachment,
	render_entry,
};
use lore_storage::{Result, db::Db, queries};

pub async fn build_entry(db: &Db, entry_id: Uuid) -> Result<Option<DocumentPayload>> {
	let Some(source) = load_entry_source(db, entry_id).await? else {
		return Ok(None);
	};

	Ok(render_entry(source))
}

pub async fn build_attachment(db: &Db, attachment_id: Uuid) -> Result<Option<DocumentPayload>> {
	let Some(attachment) = queries::fetch_attachment(&db.pool, attachment_id).await? else {
		return Ok(None);
	};

	if !attachment.is_parsed() {
		return Ok(None);
	}

	let Some(entry) = load_entry_source(db, attachment.entry_id).await? else {
		return Ok(None);
	};

	Ok(render_attachment(AttachmentSource {
		attachment_id,
		file_name: attachment.file_name,
		parsed_text: attachment.parsed_text.unwrap_or_default(),
		entry,
	}))
}

async fn load_entry_source(db: &Db, entry_id: Uuid) -> Result<Option<EntrySource>> {
	let Some(entry) = queries::fetch_entry(&db.pool, entry_id).await? else {
		return Ok(None);
	};
	let Some(entry_type) = queries::fetch_entry_type(&db.pool, entry.type_id).await? else {
		return Ok(None);
	};
	let tags = queries::fetch_entry_tags(&db.pool, entry_id).await?;

	Ok(Some(EntrySource {
		entry_id,
		entry_type: EntryTypeMeta {
			type_id: entry_type.type_id,
			code: entry_type.code,
			name: entry_type.name,
			graph_enabled: entry_type.graph_enabled,
			ai_enabled: entry_type.ai_enabled,
		},
		title: entry.title,
		summary: entry.summary,
		content: entry.content,
		tags: tags.into_iter().map(|tag| TagRef { tag_id: tag.tag_id, name: tag.name }).collect(),
	}))
}
