//! Search index adapter.
//!
//! The worker only ever sees [`Indexer`] and the [`IndexResult`] it returns. Backends report typed
//! [`IndexError`]s; the indexer folds them into a result whose `retryable` flag comes from the
//! error kind, so retry policy lives in one place.

pub mod memory;
pub mod qdrant;

use std::{fmt, future::Future, pin::Pin, sync::Arc};

use uuid::Uuid;

use lore_domain::DocumentPayload;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
	/// Network blips, timeouts, throttling. Expected to clear on its own.
	Transient,
	Config,
	/// A required external tool or service is not installed.
	Dependency,
	/// The document itself cannot be indexed.
	Payload,
	Unknown,
}
impl ErrorKind {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Transient => "transient",
			Self::Config => "config",
			Self::Dependency => "dependency",
			Self::Payload => "payload",
			Self::Unknown => "unknown",
		}
	}

	pub fn is_retryable(self) -> bool {
		matches!(self, Self::Transient | Self::Unknown)
	}
}
impl fmt::Display for ErrorKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Clone, Debug, thiserror::Error)]
#[error("{kind} error: {message}")]
pub struct IndexError {
	pub kind: ErrorKind,
	pub message: String,
}
impl IndexError {
	pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
		Self { kind, message: message.into() }
	}

	pub fn transient(message: impl Into<String>) -> Self {
		Self::new(ErrorKind::Transient, message)
	}

	pub fn config(message: impl Into<String>) -> Self {
		Self::new(ErrorKind::Config, message)
	}

	pub fn payload(message: impl Into<String>) -> Self {
		Self::new(ErrorKind::Payload, message)
	}

	pub fn unknown(message: impl Into<String>) -> Self {
		Self::new(ErrorKind::Unknown, message)
	}
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexResult {
	pub ok: bool,
	pub detail: Option<String>,
	pub retryable: bool,
	pub error_kind: Option<ErrorKind>,
}
impl IndexResult {
	pub fn success(detail: impl Into<String>) -> Self {
		Self { ok: true, detail: Some(detail.into()), retryable: false, error_kind: None }
	}

	pub fn failure(err: &IndexError) -> Self {
		Self {
			ok: false,
			detail: Some(err.message.clone()),
			retryable: err.kind.is_retryable(),
			error_kind: Some(err.kind),
		}
	}
}

pub trait IndexBackend
where
	Self: Send + Sync,
{
	fn name(&self) -> &'static str;

	/// Replaces everything indexed for `payload.subject_id` with the payload's current content.
	fn upsert<'a>(&'a self, payload: &'a DocumentPayload) -> BoxFuture<'a, Result<(), IndexError>>;

	/// Removes everything indexed for the subject. Removing an absent subject succeeds.
	fn delete<'a>(&'a self, subject_id: Uuid) -> BoxFuture<'a, Result<(), IndexError>>;
}

/// Backend used when `[indexer] backend = "disabled"` or the section was not understood.
pub struct DisabledBackend {
	reason: String,
}
impl DisabledBackend {
	pub fn new(reason: Option<String>) -> Self {
		Self { reason: reason.unwrap_or_else(|| "Indexing is disabled.".to_string()) }
	}
}
impl IndexBackend for DisabledBackend {
	fn name(&self) -> &'static str {
		"disabled"
	}

	fn upsert<'a>(&'a self, _: &'a DocumentPayload) -> BoxFuture<'a, Result<(), IndexError>> {
		Box::pin(async move { Err(IndexError::config(self.reason.clone())) })
	}

	fn delete<'a>(&'a self, _: Uuid) -> BoxFuture<'a, Result<(), IndexError>> {
		Box::pin(async move { Err(IndexError::config(self.reason.clone())) })
	}
}

#[derive(Clone)]
pub struct Indexer {
	backend: Arc<dyn IndexBackend>,
}
impl Indexer {
	pub fn new(backend: Arc<dyn IndexBackend>) -> Self {
		Self { backend }
	}

	/// Builds the configured backend. Clients and the tokenizer are created here once and owned by
	/// the returned indexer.
	pub fn from_config(cfg: &lore_config::Config) -> Result<Self, IndexError> {
		let backend: Arc<dyn IndexBackend> = match &cfg.indexer {
			lore_config::Indexer::Qdrant { wait } =>
				Arc::new(qdrant::QdrantBackend::from_config(cfg, *wait)?),
			lore_config::Indexer::Disabled { reason } => {
				tracing::warn!(reason = reason.as_deref().unwrap_or("none"), "Indexer is disabled.");

				Arc::new(DisabledBackend::new(reason.clone()))
			},
		};

		Ok(Self::new(backend))
	}

	pub fn backend_name(&self) -> &'static str {
		self.backend.name()
	}

	pub async fn upsert(&self, payload: &DocumentPayload) -> IndexResult {
		if payload.text.trim().is_empty() {
			return IndexResult::failure(&IndexError::payload("Rendered document text is empty."));
		}

		match self.backend.upsert(payload).await {
			Ok(()) => IndexResult::success(format!("Indexed {}.", payload.subject_id)),
			Err(err) => IndexResult::failure(&err),
		}
	}

	pub async fn delete(&self, subject_id: Uuid) -> IndexResult {
		match self.backend.delete(subject_id).await {
			Ok(()) => IndexResult::success(format!("Removed {subject_id}.")),
			Err(err) => IndexResult::failure(&err),
		}
	}

	pub fn shutdown(self) {
		tracing::info!(backend = self.backend.name(), "Indexer shut down.");
	}
}
