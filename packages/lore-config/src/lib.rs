mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Chunking, Config, EmbeddingProviderConfig, Indexer, Parser, Postgres, Providers, Qdrant,
	Service, Storage, WorkerConfig, Workers,
};

use std::{fs, path::Path};

use uuid::Uuid;

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;
	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);
	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.log_level.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.log_level must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.dsn.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.postgres.dsn must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}
	if cfg.indexer.is_enabled() {
		validate_index_backend(cfg)?;
	}
	if cfg.parser.max_pages == 0 {
		return Err(Error::Validation {
			message: "parser.max_pages must be greater than zero.".to_string(),
		});
	}
	if cfg.parser.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "parser.timeout_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.parser.pdftotext_bin.trim().is_empty() {
		return Err(Error::Validation {
			message: "parser.pdftotext_bin must be non-empty.".to_string(),
		});
	}

	for (label, worker) in [
		("entry_index", &cfg.workers.entry_index),
		("attachment_parse", &cfg.workers.attachment_parse),
		("attachment_index", &cfg.workers.attachment_index),
	] {
		validate_worker(label, worker)?;
	}

	validate_leases(cfg)
}

/// A lease shorter than the slowest call a handler can make lets another worker reclaim the row
/// mid-flight.
fn validate_leases(cfg: &Config) -> Result<()> {
	let mut bounds = vec![(
		"attachment_parse",
		&cfg.workers.attachment_parse,
		"parser.timeout_ms",
		cfg.parser.timeout_ms,
	)];

	if cfg.indexer.is_enabled() {
		let embedding_timeout = cfg.providers.embedding.timeout_ms;

		bounds.push((
			"entry_index",
			&cfg.workers.entry_index,
			"providers.embedding.timeout_ms",
			embedding_timeout,
		));
		bounds.push((
			"attachment_index",
			&cfg.workers.attachment_index,
			"providers.embedding.timeout_ms",
			embedding_timeout,
		));
	}

	for (label, worker, timeout_label, timeout_ms) in bounds {
		if worker.enabled && worker.lock_ttl_sec.saturating_mul(1_000) <= timeout_ms {
			return Err(Error::Validation {
				message: format!(
					"workers.{label}.lock_ttl_sec must be longer than {timeout_label} ({timeout_ms} ms)."
				),
			});
		}
	}

	Ok(())
}

fn validate_index_backend(cfg: &Config) -> Result<()> {
	if cfg.storage.qdrant.url.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.qdrant.url must be non-empty.".to_string(),
		});
	}
	if cfg.storage.qdrant.collection.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.qdrant.collection must be non-empty.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions != cfg.storage.qdrant.vector_dim {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must match storage.qdrant.vector_dim."
				.to_string(),
		});
	}
	if cfg.providers.embedding.api_key.trim().is_empty() {
		return Err(Error::Validation {
			message: "Provider embedding api_key must be non-empty.".to_string(),
		});
	}
	if cfg.chunking.max_tokens == 0 {
		return Err(Error::Validation {
			message: "chunking.max_tokens must be greater than zero.".to_string(),
		});
	}
	if cfg.chunking.overlap_tokens >= cfg.chunking.max_tokens {
		return Err(Error::Validation {
			message: "chunking.overlap_tokens must be less than chunking.max_tokens.".to_string(),
		});
	}

	Ok(())
}

fn validate_worker(label: &str, worker: &WorkerConfig) -> Result<()> {
	if worker.poll_interval_ms == 0 {
		return Err(Error::Validation {
			message: format!("workers.{label}.poll_interval_ms must be greater than zero."),
		});
	}
	if worker.batch_size == 0 {
		return Err(Error::Validation {
			message: format!("workers.{label}.batch_size must be greater than zero."),
		});
	}
	if worker.max_attempts == 0 {
		return Err(Error::Validation {
			message: format!("workers.{label}.max_attempts must be greater than zero."),
		});
	}
	if worker.lock_ttl_sec == 0 {
		return Err(Error::Validation {
			message: format!("workers.{label}.lock_ttl_sec must be greater than zero."),
		});
	}
	if worker.base_backoff_ms == 0 {
		return Err(Error::Validation {
			message: format!("workers.{label}.base_backoff_ms must be greater than zero."),
		});
	}
	if worker.max_backoff_ms < worker.base_backoff_ms {
		return Err(Error::Validation {
			message: format!(
				"workers.{label}.max_backoff_ms must be at least workers.{label}.base_backoff_ms."
			),
		});
	}
	if worker.worker_id.trim().is_empty() {
		return Err(Error::Validation {
			message: format!("workers.{label}.worker_id must be non-empty."),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	if cfg.chunking.tokenizer_repo.as_deref().map(|repo| repo.trim().is_empty()).unwrap_or(false) {
		cfg.chunking.tokenizer_repo = None;
	}

	for extension in &mut cfg.parser.allowed_extensions {
		*extension = extension.trim().trim_start_matches('.').to_ascii_lowercase();
	}

	cfg.parser.allowed_extensions.retain(|extension| !extension.is_empty());

	let instance = Uuid::new_v4().simple().to_string();

	for (label, worker) in [
		("entry-index", &mut cfg.workers.entry_index),
		("attachment-parse", &mut cfg.workers.attachment_parse),
		("attachment-index", &mut cfg.workers.attachment_index),
	] {
		let trimmed = worker.worker_id.trim().to_string();

		worker.worker_id = if trimmed.is_empty() {
			format!("{label}-{}-{}", std::process::id(), &instance[..12])
		} else {
			trimmed
		};
	}
}
