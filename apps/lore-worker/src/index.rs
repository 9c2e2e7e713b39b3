use lore_index::ErrorKind;
use lore_storage::outbox::{ClaimedEvent, OutboxFamily, OutboxOp};

use crate::{
	payload,
	worker::{Outcome, WorkerState},
};

/// Handles a row of either index family. Upserts whose subject is gone or no longer eligible
/// become deletes, which retracts anything indexed earlier.
pub(crate) async fn handle(
	state: &WorkerState,
	family: OutboxFamily,
	claimed: &ClaimedEvent,
) -> color_eyre::Result<Outcome> {
	let subject_id = claimed.event.subject_id;
	let op = match claimed.op() {
		Ok(op) => op,
		Err(err) => return Ok(Outcome::failure(ErrorKind::Payload, err.to_string())),
	};
	let result = match op {
		OutboxOp::Delete => state.indexer.delete(subject_id).await,
		OutboxOp::Upsert => {
			let payload = match family {
				OutboxFamily::AttachmentIndex =>
					payload::build_attachment(&state.db, subject_id).await?,
				_ => payload::build_entry(&state.db, subject_id).await?,
			};

			match payload {
				Some(payload) => state.indexer.upsert(&payload).await,
				None => {
					tracing::info!(
						family = family.as_str(),
						subject_id = %subject_id,
						"Subject missing or not indexable. Removing from index."
					);

					state.indexer.delete(subject_id).await
				},
			}
		},
		OutboxOp::Parse =>
			return Ok(Outcome::failure(
				ErrorKind::Payload,
				format!("Op parse is not valid for the {family} outbox."),
			)),
	};

	Ok(Outcome::from_index(result))
}
