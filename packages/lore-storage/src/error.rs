use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Sqlx(#[from] sqlx::Error),
	#[error("Invalid argument: {0}")]
	InvalidArgument(String),
	#[error("Not found: {0}")]
	NotFound(String),
	/// The row is no longer held by the caller's claim: its lease expired and another worker took
	/// it, or it was already resolved.
	#[error("Lease lost on {table} row {id}.")]
	LeaseLost { table: &'static str, id: Uuid },
}
