//! In-process backend for tests and local runs without Qdrant.

use std::{
	collections::{HashMap, VecDeque},
	sync::{
		Mutex,
		atomic::{AtomicUsize, Ordering},
	},
};

use uuid::Uuid;

use crate::{BoxFuture, IndexBackend, IndexError};
use lore_domain::DocumentPayload;

#[derive(Default)]
pub struct MemoryBackend {
	documents: Mutex<HashMap<Uuid, DocumentPayload>>,
	injected: Mutex<VecDeque<IndexError>>,
	upserts: AtomicUsize,
	deletes: AtomicUsize,
}
impl MemoryBackend {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn get(&self, subject_id: Uuid) -> Option<DocumentPayload> {
		self.documents.lock().unwrap_or_else(|err| err.into_inner()).get(&subject_id).cloned()
	}

	pub fn contains(&self, subject_id: Uuid) -> bool {
		self.documents.lock().unwrap_or_else(|err| err.into_inner()).contains_key(&subject_id)
	}

	pub fn len(&self) -> usize {
		self.documents.lock().unwrap_or_else(|err| err.into_inner()).len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Number of upsert calls that reached the backend, including failed ones.
	pub fn upsert_calls(&self) -> usize {
		self.upserts.load(Ordering::SeqCst)
	}

	pub fn delete_calls(&self) -> usize {
		self.deletes.load(Ordering::SeqCst)
	}

	/// Queues an error returned by the next call instead of applying it.
	pub fn fail_next(&self, err: IndexError) {
		self.injected.lock().unwrap_or_else(|err| err.into_inner()).push_back(err);
	}

	fn take_injected(&self) -> Option<IndexError> {
		self.injected.lock().unwrap_or_else(|err| err.into_inner()).pop_front()
	}
}
impl IndexBackend for MemoryBackend {
	fn name(&self) -> &'static str {
		"memory"
	}

	fn upsert<'a>(&'a self, payload: &'a DocumentPayload) -> BoxFuture<'a, Result<(), IndexError>> {
		Box::pin(async move {
			self.upserts.fetch_add(1, Ordering::SeqCst);

			if let Some(err) = self.take_injected() {
				return Err(err);
			}

			self.documents
				.lock()
				.unwrap_or_else(|err| err.into_inner())
				.insert(payload.subject_id, payload.clone());

			Ok(())
		})
	}

	fn delete<'a>(&'a self, subject_id: Uuid) -> BoxFuture<'a, Result<(), IndexError>> {
		Box::pin(async move {
			self.deletes.fetch_add(1, Ordering::SeqCst);

			if let Some(err) = self.take_injected() {
				return Err(err);
			}

			self.documents.lock().unwrap_or_else(|err| err.into_inner()).remove(&subject_id);

			Ok(())
		})
	}
}
