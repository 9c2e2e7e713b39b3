use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	pub chunking: Chunking,
	#[serde(default, deserialize_with = "lenient_indexer")]
	pub indexer: Indexer,
	#[serde(default)]
	pub parser: Parser,
	pub workers: Workers,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
	pub qdrant: Qdrant,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Deserialize)]
pub struct Qdrant {
	pub url: String,
	pub collection: String,
	pub vector_dim: u32,
}

#[derive(Debug, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
}

#[derive(Clone, Debug, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct Chunking {
	pub max_tokens: u32,
	pub overlap_tokens: u32,
	pub tokenizer_repo: Option<String>,
}

/// Index backend selection.
///
/// The section is a closed set of shapes. Anything that does not match one of them is read as
/// [`Indexer::Disabled`] with the mismatch recorded in `reason`, so a typo disables indexing
/// instead of refusing to start the producers that share this file.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case", deny_unknown_fields)]
pub enum Indexer {
	Qdrant {
		#[serde(default = "default_wait")]
		wait: bool,
	},
	Disabled {
		#[serde(default)]
		reason: Option<String>,
	},
}
impl Indexer {
	pub fn is_enabled(&self) -> bool {
		matches!(self, Self::Qdrant { .. })
	}
}
impl Default for Indexer {
	fn default() -> Self {
		Self::Qdrant { wait: default_wait() }
	}
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Parser {
	pub pdftotext_bin: String,
	pub max_pages: u32,
	pub timeout_ms: u64,
	pub allowed_extensions: Vec<String>,
}
impl Default for Parser {
	fn default() -> Self {
		Self {
			pdftotext_bin: "pdftotext".to_string(),
			max_pages: 200,
			timeout_ms: 60_000,
			allowed_extensions: ["pdf", "txt", "md", "markdown", "csv", "json", "html", "htm", "log"]
				.into_iter()
				.map(str::to_string)
				.collect(),
		}
	}
}

#[derive(Debug, Deserialize)]
pub struct Workers {
	#[serde(default)]
	pub entry_index: WorkerConfig,
	#[serde(default = "default_parse_worker")]
	pub attachment_parse: WorkerConfig,
	#[serde(default)]
	pub attachment_index: WorkerConfig,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
	pub enabled: bool,
	pub poll_interval_ms: u64,
	pub batch_size: u32,
	pub max_attempts: u32,
	pub lock_ttl_sec: u64,
	/// Lease owner recorded in `locked_by`. Must be unique per running process; left empty, a
	/// unique id is generated at load time.
	pub worker_id: String,
	pub base_backoff_ms: u64,
	pub max_backoff_ms: u64,
}
impl Default for WorkerConfig {
	fn default() -> Self {
		Self {
			enabled: true,
			poll_interval_ms: 500,
			batch_size: 16,
			max_attempts: 8,
			lock_ttl_sec: 30,
			worker_id: String::new(),
			base_backoff_ms: 500,
			max_backoff_ms: 30_000,
		}
	}
}

/// Parsing can run up to `parser.timeout_ms`, so its lease has to outlast the default timeout.
fn default_parse_worker() -> WorkerConfig {
	WorkerConfig { lock_ttl_sec: 120, ..WorkerConfig::default() }
}

fn default_wait() -> bool {
	true
}

fn lenient_indexer<'de, D>(deserializer: D) -> Result<Indexer, D::Error>
where
	D: Deserializer<'de>,
{
	let raw = toml::Value::deserialize(deserializer)?;

	Ok(raw.try_into::<Indexer>().unwrap_or_else(|err| Indexer::Disabled {
		reason: Some(format!("Unrecognized [indexer] section: {}", err.message().trim())),
	}))
}
