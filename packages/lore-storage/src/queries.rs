use sqlx::{PgConnection, PgExecutor};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	Result,
	models::{Attachment, Entry, EntryType, Tag},
};

pub async fn insert_entry_type<'e, E>(executor: E, entry_type: &EntryType) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
INSERT INTO entry_types (type_id, code, name, graph_enabled, ai_enabled, created_at, updated_at)
VALUES ($1, $2, $3, $4, $5, $6, $7)",
	)
	.bind(entry_type.type_id)
	.bind(entry_type.code.as_str())
	.bind(entry_type.name.as_str())
	.bind(entry_type.graph_enabled)
	.bind(entry_type.ai_enabled)
	.bind(entry_type.created_at)
	.bind(entry_type.updated_at)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn fetch_entry_type<'e, E>(executor: E, type_id: Uuid) -> Result<Option<EntryType>>
where
	E: PgExecutor<'e>,
{
	let row = sqlx::query_as::<_, EntryType>("SELECT * FROM entry_types WHERE type_id = $1")
		.bind(type_id)
		.fetch_optional(executor)
		.await?;

	Ok(row)
}

/// Returns `None` when the type does not exist.
pub async fn update_entry_type_flags<'e, E>(
	executor: E,
	type_id: Uuid,
	graph_enabled: bool,
	ai_enabled: bool,
	now: OffsetDateTime,
) -> Result<Option<EntryType>>
where
	E: PgExecutor<'e>,
{
	let row = sqlx::query_as::<_, EntryType>(
		"\
UPDATE entry_types
SET graph_enabled = $2, ai_enabled = $3, updated_at = $4
WHERE type_id = $1
RETURNING *",
	)
	.bind(type_id)
	.bind(graph_enabled)
	.bind(ai_enabled)
	.bind(now)
	.fetch_optional(executor)
	.await?;

	Ok(row)
}

pub async fn insert_entry<'e, E>(executor: E, entry: &Entry) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
INSERT INTO entries (entry_id, type_id, title, summary, content, created_at, updated_at)
VALUES ($1, $2, $3, $4, $5, $6, $7)",
	)
	.bind(entry.entry_id)
	.bind(entry.type_id)
	.bind(entry.title.as_str())
	.bind(entry.summary.as_deref())
	.bind(entry.content.as_str())
	.bind(entry.created_at)
	.bind(entry.updated_at)
	.execute(executor)
	.await?;

	Ok(())
}

/// Returns `false` when the entry does not exist.
pub async fn update_entry<'e, E>(executor: E, entry: &Entry) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"\
UPDATE entries
SET type_id = $2, title = $3, summary = $4, content = $5, updated_at = $6
WHERE entry_id = $1",
	)
	.bind(entry.entry_id)
	.bind(entry.type_id)
	.bind(entry.title.as_str())
	.bind(entry.summary.as_deref())
	.bind(entry.content.as_str())
	.bind(entry.updated_at)
	.execute(executor)
	.await?;

	Ok(result.rows_affected() > 0)
}

pub async fn fetch_entry<'e, E>(executor: E, entry_id: Uuid) -> Result<Option<Entry>>
where
	E: PgExecutor<'e>,
{
	let row = sqlx::query_as::<_, Entry>("SELECT * FROM entries WHERE entry_id = $1")
		.bind(entry_id)
		.fetch_optional(executor)
		.await?;

	Ok(row)
}

/// Deletes the entry. Its tags links and attachments go with it through `ON DELETE CASCADE`.
pub async fn delete_entry<'e, E>(executor: E, entry_id: Uuid) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query("DELETE FROM entries WHERE entry_id = $1")
		.bind(entry_id)
		.execute(executor)
		.await?;

	Ok(result.rows_affected() > 0)
}

pub async fn list_entry_ids_by_type<'e, E>(executor: E, type_id: Uuid) -> Result<Vec<Uuid>>
where
	E: PgExecutor<'e>,
{
	let ids = sqlx::query_scalar("SELECT entry_id FROM entries WHERE type_id = $1 ORDER BY entry_id")
		.bind(type_id)
		.fetch_all(executor)
		.await?;

	Ok(ids)
}

pub async fn list_entry_ids<'e, E>(executor: E) -> Result<Vec<Uuid>>
where
	E: PgExecutor<'e>,
{
	let ids = sqlx::query_scalar("SELECT entry_id FROM entries ORDER BY entry_id")
		.fetch_all(executor)
		.await?;

	Ok(ids)
}

/// Replaces the entry's tag set, creating tags by name as needed.
pub async fn set_entry_tags(conn: &mut PgConnection, entry_id: Uuid, names: &[String]) -> Result<()> {
	sqlx::query("DELETE FROM entry_tags WHERE entry_id = $1")
		.bind(entry_id)
		.execute(&mut *conn)
		.await?;

	for name in names {
		let name = name.trim();

		if name.is_empty() {
			continue;
		}

		let tag_id: Uuid = sqlx::query_scalar(
			"\
INSERT INTO tags (tag_id, name)
VALUES ($1, $2)
ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
RETURNING tag_id",
		)
		.bind(Uuid::new_v4())
		.bind(name)
		.fetch_one(&mut *conn)
		.await?;

		sqlx::query(
			"INSERT INTO entry_tags (entry_id, tag_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
		)
		.bind(entry_id)
		.bind(tag_id)
		.execute(&mut *conn)
		.await?;
	}

	Ok(())
}

pub async fn fetch_entry_tags<'e, E>(executor: E, entry_id: Uuid) -> Result<Vec<Tag>>
where
	E: PgExecutor<'e>,
{
	let rows = sqlx::query_as::<_, Tag>(
		"\
SELECT t.tag_id, t.name
FROM entry_tags et
JOIN tags t ON t.tag_id = et.tag_id
WHERE et.entry_id = $1
ORDER BY t.name",
	)
	.bind(entry_id)
	.fetch_all(executor)
	.await?;

	Ok(rows)
}

pub async fn insert_attachment<'e, E>(executor: E, attachment: &Attachment) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
INSERT INTO attachments (
	attachment_id,
	entry_id,
	file_name,
	file_path,
	content_type,
	size_bytes,
	parse_status,
	parsed_text,
	parse_error,
	created_at,
	updated_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
	)
	.bind(attachment.attachment_id)
	.bind(attachment.entry_id)
	.bind(attachment.file_name.as_str())
	.bind(attachment.file_path.as_str())
	.bind(attachment.content_type.as_str())
	.bind(attachment.size_bytes)
	.bind(attachment.parse_status.as_str())
	.bind(attachment.parsed_text.as_deref())
	.bind(attachment.parse_error.as_deref())
	.bind(attachment.created_at)
	.bind(attachment.updated_at)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn fetch_attachment<'e, E>(executor: E, attachment_id: Uuid) -> Result<Option<Attachment>>
where
	E: PgExecutor<'e>,
{
	let row = sqlx::query_as::<_, Attachment>("SELECT * FROM attachments WHERE attachment_id = $1")
		.bind(attachment_id)
		.fetch_optional(executor)
		.await?;

	Ok(row)
}

pub async fn delete_attachment<'e, E>(executor: E, attachment_id: Uuid) -> Result<Option<Uuid>>
where
	E: PgExecutor<'e>,
{
	let entry_id = sqlx::query_scalar(
		"DELETE FROM attachments WHERE attachment_id = $1 RETURNING entry_id",
	)
	.bind(attachment_id)
	.fetch_optional(executor)
	.await?;

	Ok(entry_id)
}

pub async fn list_attachment_ids_by_entry<'e, E>(executor: E, entry_id: Uuid) -> Result<Vec<Uuid>>
where
	E: PgExecutor<'e>,
{
	let ids = sqlx::query_scalar(
		"SELECT attachment_id FROM attachments WHERE entry_id = $1 ORDER BY attachment_id",
	)
	.bind(entry_id)
	.fetch_all(executor)
	.await?;

	Ok(ids)
}

/// Parsed attachments whose owning entry has the given type, with their entry ids.
pub async fn list_parsed_attachments_by_type<'e, E>(
	executor: E,
	type_id: Uuid,
) -> Result<Vec<(Uuid, Uuid)>>
where
	E: PgExecutor<'e>,
{
	let rows = sqlx::query_as(
		"\
SELECT a.attachment_id, a.entry_id
FROM attachments a
JOIN entries e ON e.entry_id = a.entry_id
WHERE e.type_id = $1 AND a.parse_status = 'parsed'
ORDER BY a.attachment_id",
	)
	.bind(type_id)
	.fetch_all(executor)
	.await?;

	Ok(rows)
}

pub async fn list_parsed_attachments<'e, E>(executor: E) -> Result<Vec<(Uuid, Uuid)>>
where
	E: PgExecutor<'e>,
{
	let rows = sqlx::query_as(
		"\
SELECT attachment_id, entry_id
FROM attachments
WHERE parse_status = 'parsed'
ORDER BY attachment_id",
	)
	.fetch_all(executor)
	.await?;

	Ok(rows)
}

/// Stores extracted text and marks the attachment parsed. Returns the new `updated_at`, or `None`
/// when the attachment is gone.
pub async fn store_parsed_text<'e, E>(
	executor: E,
	attachment_id: Uuid,
	parsed_text: &str,
	now: OffsetDateTime,
) -> Result<Option<OffsetDateTime>>
where
	E: PgExecutor<'e>,
{
	let updated_at = sqlx::query_scalar(
		"\
UPDATE attachments
SET parsed_text = $2, parse_status = 'parsed', parse_error = NULL, updated_at = $3
WHERE attachment_id = $1
RETURNING updated_at",
	)
	.bind(attachment_id)
	.bind(parsed_text)
	.bind(now)
	.fetch_optional(executor)
	.await?;

	Ok(updated_at)
}

pub async fn record_parse_failure<'e, E>(
	executor: E,
	attachment_id: Uuid,
	error: &str,
	now: OffsetDateTime,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
UPDATE attachments
SET parse_status = 'failed', parse_error = $2, updated_at = $3
WHERE attachment_id = $1",
	)
	.bind(attachment_id)
	.bind(error)
	.bind(now)
	.execute(executor)
	.await?;

	Ok(())
}
