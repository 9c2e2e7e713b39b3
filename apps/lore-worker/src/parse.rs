use std::path::Path;

use time::OffsetDateTime;

use lore_index::ErrorKind;
use lore_providers::parser::{self, ParseError};
use lore_storage::{
	Error,
	outbox::{self, ClaimedEvent, NewEvent, OutboxFamily, OutboxOp},
	queries,
};

use crate::worker::{Outcome, WorkerState};

pub(crate) async fn handle(state: &WorkerState, claimed: &ClaimedEvent) -> color_eyre::Result<Outcome> {
	let attachment_id = claimed.event.subject_id;

	match claimed.op() {
		Ok(OutboxOp::Parse) => {},
		Ok(other) =>
			return Ok(Outcome::failure(
				ErrorKind::Payload,
				format!("Op {} is not valid for the attachment_parse outbox.", other.as_str()),
			)),
		Err(err) => return Ok(Outcome::failure(ErrorKind::Payload, err.to_string())),
	}

	let Some(attachment) = queries::fetch_attachment(&state.db.pool, attachment_id).await? else {
		tracing::info!(attachment_id = %attachment_id, "Attachment missing for parse row. Marking done.");

		return Ok(Outcome::Done);
	};
	let text =
		match parser::parse(&state.parser, Path::new(&attachment.file_path), &attachment.content_type)
			.await
		{
			Ok(text) => text,
			Err(err) => return Ok(Outcome::failure(parse_error_kind(&err), err.to_string())),
		};
	let now = OffsetDateTime::now_utc();
	// The parsed text, the follow-up index row and the parse row's deletion commit together.
	let mut tx = state.db.pool.begin().await?;
	let Some(updated_at) =
		queries::store_parsed_text(&mut *tx, attachment_id, &text, now).await?
	else {
		return Ok(Outcome::Done);
	};

	outbox::enqueue(
		&mut *tx,
		OutboxFamily::AttachmentIndex,
		NewEvent {
			subject_id: attachment_id,
			secondary_id: Some(attachment.entry_id),
			op: OutboxOp::Upsert,
			subject_updated_at: Some(updated_at),
		},
		now,
	)
	.await?;

	match outbox::mark_succeeded(&mut *tx, OutboxFamily::AttachmentParse, &claimed.claim).await {
		Ok(()) => {},
		Err(Error::LeaseLost { .. }) => {
			tracing::warn!(
				outbox_id = %claimed.event.id,
				attachment_id = %attachment_id,
				"Lease lost while storing parsed text. Discarding result."
			);

			return Ok(Outcome::Resolved);
		},
		Err(err) => return Err(err.into()),
	}

	tx.commit().await?;
	tracing::debug!(
		attachment_id = %attachment_id,
		chars = text.chars().count(),
		"Attachment parsed."
	);

	Ok(Outcome::Resolved)
}

fn parse_error_kind(err: &ParseError) -> ErrorKind {
	match err {
		ParseError::UnsupportedFileType(_) => ErrorKind::Payload,
		ParseError::MissingDependency(_) => ErrorKind::Dependency,
		ParseError::Extraction(_) | ParseError::Io(_) => ErrorKind::Transient,
	}
}
