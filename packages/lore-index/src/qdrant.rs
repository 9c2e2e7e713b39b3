use std::collections::HashMap;

use qdrant_client::{
	Qdrant, QdrantError,
	client::Payload,
	qdrant::{
		Condition, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder, DeletePointsBuilder,
		Distance, Document, FieldType, Filter, Modifier, PointStruct, Range,
		SparseVectorParamsBuilder, SparseVectorsConfigBuilder, UpsertPointsBuilder, Value, Vector,
		VectorParamsBuilder, VectorsConfigBuilder,
	},
};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::{BoxFuture, ErrorKind, IndexBackend, IndexError};
use lore_chunking::{ChunkingConfig, SubjectChunk, Tokenizer};
use lore_domain::DocumentPayload;
use lore_providers::embedding::EmbeddingClient;

pub const DENSE_VECTOR_NAME: &str = "dense";
pub const BM25_VECTOR_NAME: &str = "bm25";
pub const BM25_MODEL: &str = "qdrant/bm25";

const PAYLOAD_INDEXES: [(&str, FieldType); 5] = [
	("subject_id", FieldType::Keyword),
	("entry_id", FieldType::Keyword),
	("kind", FieldType::Keyword),
	("type_code", FieldType::Keyword),
	("chunk_index", FieldType::Integer),
];

pub struct QdrantStore {
	pub client: Qdrant,
	pub collection: String,
	pub vector_dim: u32,
}
impl QdrantStore {
	pub fn new(cfg: &lore_config::Qdrant) -> Result<Self, QdrantError> {
		let client = Qdrant::from_url(&cfg.url).build()?;

		Ok(Self { client, collection: cfg.collection.clone(), vector_dim: cfg.vector_dim })
	}

	/// Creates the collection with dense and BM25 vectors plus payload indexes when it does not
	/// exist yet. Deployments normally run `qdrant/init.sh` instead.
	pub async fn ensure_collection(&self) -> Result<(), QdrantError> {
		if self.client.collection_exists(self.collection.clone()).await? {
			return Ok(());
		}

		let mut vectors_config = VectorsConfigBuilder::default();

		vectors_config.add_named_vector_params(
			DENSE_VECTOR_NAME,
			VectorParamsBuilder::new(self.vector_dim.into(), Distance::Cosine),
		);

		let mut sparse_vectors_config = SparseVectorsConfigBuilder::default();

		sparse_vectors_config.add_named_vector_params(
			BM25_VECTOR_NAME,
			SparseVectorParamsBuilder::default().modifier(Modifier::Idf as i32),
		);

		self.client
			.create_collection(
				CreateCollectionBuilder::new(self.collection.clone())
					.vectors_config(vectors_config)
					.sparse_vectors_config(sparse_vectors_config),
			)
			.await?;

		for (field, field_type) in PAYLOAD_INDEXES {
			self.client
				.create_field_index(
					CreateFieldIndexCollectionBuilder::new(self.collection.clone(), field, field_type)
						.wait(true),
				)
				.await?;
		}

		Ok(())
	}
}

/// Chunked hybrid index: one point per chunk, dense vector from the embedding provider and a BM25
/// document vector inferred by Qdrant.
pub struct QdrantBackend {
	store: QdrantStore,
	embedding: EmbeddingClient,
	tokenizer: Tokenizer,
	chunking: ChunkingConfig,
	wait: bool,
}
impl QdrantBackend {
	pub fn new(
		store: QdrantStore,
		embedding: EmbeddingClient,
		tokenizer: Tokenizer,
		chunking: ChunkingConfig,
		wait: bool,
	) -> Self {
		Self { store, embedding, tokenizer, chunking, wait }
	}

	pub fn from_config(cfg: &lore_config::Config, wait: bool) -> Result<Self, IndexError> {
		let store = QdrantStore::new(&cfg.storage.qdrant)
			.map_err(|err| IndexError::config(format!("Failed to build Qdrant client: {err}.")))?;
		let embedding = EmbeddingClient::new(&cfg.providers.embedding).map_err(|err| {
			IndexError::config(format!("Failed to build embedding client: {err}."))
		})?;
		let tokenizer_repo = cfg
			.chunking
			.tokenizer_repo
			.clone()
			.unwrap_or_else(|| cfg.providers.embedding.model.clone());
		let tokenizer = lore_chunking::load_tokenizer(&tokenizer_repo).map_err(|err| {
			IndexError::config(format!("Failed to load tokenizer {tokenizer_repo:?}: {err}."))
		})?;
		let chunking = ChunkingConfig {
			max_tokens: cfg.chunking.max_tokens,
			overlap_tokens: cfg.chunking.overlap_tokens,
		};

		Ok(Self::new(store, embedding, tokenizer, chunking, wait))
	}

	pub fn store(&self) -> &QdrantStore {
		&self.store
	}

	async fn upsert_document(&self, payload: &DocumentPayload) -> Result<(), IndexError> {
		let chunks = lore_chunking::chunk_subject(
			payload.subject_id,
			&payload.text,
			&self.chunking,
			&self.tokenizer,
		);

		if chunks.is_empty() {
			return Err(IndexError::payload("Chunking produced no chunks."));
		}

		let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
		let vectors = self.embedding.embed(&texts).await.map_err(|err| {
			IndexError::new(classify_embedding_error(&err), format!("Embedding failed: {err}"))
		})?;

		validate_vectors(&vectors, chunks.len(), self.store.vector_dim)?;

		let points = chunks
			.iter()
			.zip(vectors)
			.map(|(chunk, vector)| build_point(payload, chunk, vector))
			.collect::<Vec<_>>();

		self.store
			.client
			.upsert_points(
				UpsertPointsBuilder::new(self.store.collection.clone(), points).wait(self.wait),
			)
			.await
			.map_err(qdrant_error)?;

		// Points past the new chunk count belong to a longer previous version.
		self.delete_points(payload.subject_id, Some(chunks.len())).await
	}

	async fn delete_points(
		&self,
		subject_id: Uuid,
		from_chunk: Option<usize>,
	) -> Result<(), IndexError> {
		let mut conditions = vec![Condition::matches("subject_id", subject_id.to_string())];

		if let Some(from_chunk) = from_chunk {
			conditions.push(Condition::range(
				"chunk_index",
				Range { gte: Some(from_chunk as f64), ..Default::default() },
			));
		}

		let delete = DeletePointsBuilder::new(self.store.collection.clone())
			.points(Filter::must(conditions))
			.wait(self.wait);

		match self.store.client.delete_points(delete).await {
			Ok(_) => Ok(()),
			Err(err) if is_not_found_error(&err) => {
				tracing::info!(subject_id = %subject_id, "Qdrant points missing during delete.");

				Ok(())
			},
			Err(err) => Err(qdrant_error(err)),
		}
	}
}
impl IndexBackend for QdrantBackend {
	fn name(&self) -> &'static str {
		"qdrant"
	}

	fn upsert<'a>(&'a self, payload: &'a DocumentPayload) -> BoxFuture<'a, Result<(), IndexError>> {
		Box::pin(self.upsert_document(payload))
	}

	fn delete<'a>(&'a self, subject_id: Uuid) -> BoxFuture<'a, Result<(), IndexError>> {
		Box::pin(self.delete_points(subject_id, None))
	}
}

fn build_point(payload: &DocumentPayload, chunk: &SubjectChunk, vector: Vec<f32>) -> PointStruct {
	let tag_names: Vec<&str> = payload.tags.iter().map(|tag| tag.name.as_str()).collect();
	let mut payload_map = HashMap::new();

	payload_map.insert("subject_id".to_string(), Value::from(payload.subject_id.to_string()));
	payload_map.insert("kind".to_string(), Value::from(payload.kind.as_str().to_string()));
	payload_map.insert("entry_id".to_string(), Value::from(payload.entry_id.to_string()));
	payload_map.insert("chunk_id".to_string(), Value::from(chunk.chunk_id.to_string()));
	payload_map.insert("chunk_index".to_string(), Value::from(i64::from(chunk.chunk_index)));
	payload_map.insert("start_offset".to_string(), Value::from(chunk.start_offset as i64));
	payload_map.insert("end_offset".to_string(), Value::from(chunk.end_offset as i64));
	payload_map.insert("type_code".to_string(), Value::from(payload.entry_type.code.clone()));
	payload_map.insert("type_name".to_string(), Value::from(payload.entry_type.name.clone()));
	payload_map.insert("graph_enabled".to_string(), Value::from(payload.entry_type.graph_enabled));
	payload_map.insert("title".to_string(), Value::from(payload.title.clone()));
	payload_map.insert("tags".to_string(), Value::from(serde_json::json!(tag_names)));
	payload_map.insert(
		"file_name".to_string(),
		Value::from(match &payload.file_name {
			Some(name) => JsonValue::String(name.clone()),
			None => JsonValue::Null,
		}),
	);
	payload_map.insert("text".to_string(), Value::from(chunk.text.clone()));

	let mut vector_map = HashMap::new();

	vector_map.insert(DENSE_VECTOR_NAME.to_string(), Vector::from(vector));
	vector_map.insert(
		BM25_VECTOR_NAME.to_string(),
		Vector::from(Document::new(chunk.text.clone(), BM25_MODEL)),
	);

	PointStruct::new(chunk.chunk_id.to_string(), vector_map, Payload::from(payload_map))
}

fn validate_vectors(vectors: &[Vec<f32>], expected: usize, dim: u32) -> Result<(), IndexError> {
	if vectors.len() != expected {
		return Err(IndexError::config(format!(
			"Embedding provider returned {} vectors for {expected} chunks.",
			vectors.len()
		)));
	}

	if let Some(vector) = vectors.iter().find(|vector| vector.len() != dim as usize) {
		return Err(IndexError::config(format!(
			"Embedding dimension {} does not match configured vector_dim {dim}.",
			vector.len()
		)));
	}

	Ok(())
}

fn qdrant_error(err: QdrantError) -> IndexError {
	let message = err.to_string();

	IndexError::new(classify_qdrant_message(&message), format!("Qdrant request failed: {message}"))
}

fn is_not_found_error(err: &QdrantError) -> bool {
	let message = err.to_string().to_lowercase();
	let point_not_found =
		(message.contains("not found") || message.contains("404")) && message.contains("point");
	let no_point_found = message.contains("no point") && message.contains("found");

	point_not_found || no_point_found
}

pub fn classify_embedding_error(err: &lore_providers::Error) -> ErrorKind {
	match err {
		lore_providers::Error::Reqwest(err) =>
			if err.is_timeout() || err.is_connect() {
				ErrorKind::Transient
			} else if let Some(status) = err.status() {
				classify_http_status(status.as_u16())
			} else if err.is_decode() || err.is_body() {
				ErrorKind::Unknown
			} else {
				ErrorKind::Transient
			},
		lore_providers::Error::Status { status, .. } => classify_http_status(*status),
		lore_providers::Error::InvalidHeaderName(_)
		| lore_providers::Error::InvalidHeaderValue(_)
		| lore_providers::Error::InvalidConfig { .. } => ErrorKind::Config,
		lore_providers::Error::InvalidResponse { .. } => ErrorKind::Unknown,
	}
}

pub fn classify_http_status(status: u16) -> ErrorKind {
	match status {
		429 | 500..=599 => ErrorKind::Transient,
		401 | 403 | 404 => ErrorKind::Config,
		400 | 413 | 422 => ErrorKind::Payload,
		_ => ErrorKind::Unknown,
	}
}

/// Qdrant errors arrive as gRPC status text, so classification goes by message.
pub fn classify_qdrant_message(message: &str) -> ErrorKind {
	let message = message.to_lowercase();
	let matches_any = |needles: &[&str]| needles.iter().any(|needle| message.contains(needle));

	if matches_any(&["unauthenticated", "permission denied", "permissiondenied", "api key"]) {
		return ErrorKind::Config;
	}
	if message.contains("collection") && matches_any(&["not found", "doesn't exist", "does not exist"])
	{
		return ErrorKind::Config;
	}
	if matches_any(&["unavailable", "deadline", "timed out", "timeout", "connection", "transport"]) {
		return ErrorKind::Transient;
	}
	if matches_any(&["invalid argument", "invalidargument", "bad request", "wrong input"]) {
		return ErrorKind::Payload;
	}

	ErrorKind::Unknown
}
