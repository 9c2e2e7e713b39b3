use std::{
	env, fs,
	path::PathBuf,
	sync::atomic::{AtomicU64, Ordering},
	time::{SystemTime, UNIX_EPOCH},
};

use toml::Value;

use lore_config::{Config, Indexer};

const SAMPLE_CONFIG_TEMPLATE_TOML: &str = include_str!("fixtures/sample_config.template.toml");

fn sample_value() -> Value {
	toml::from_str(SAMPLE_CONFIG_TEMPLATE_TOML).expect("Failed to parse template config.")
}

fn set(value: &mut Value, path: &[&str], leaf: Value) {
	let (last, parents) = path.split_last().expect("Path must be non-empty.");
	let mut table = value.as_table_mut().expect("Template config must be a table.");

	for key in parents {
		table = table
			.get_mut(*key)
			.and_then(Value::as_table_mut)
			.unwrap_or_else(|| panic!("Template config must include [{key}]."));
	}

	table.insert(last.to_string(), leaf);
}

fn write_temp_config(value: &Value) -> PathBuf {
	static COUNTER: AtomicU64 = AtomicU64::new(0);

	let nanos = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.expect("System time must be valid.")
		.as_nanos();
	let ordinal = COUNTER.fetch_add(1, Ordering::SeqCst);
	let pid = std::process::id();
	let mut path = env::temp_dir();

	path.push(format!("lore_config_test_{nanos}_{pid}_{ordinal}.toml"));

	fs::write(&path, toml::to_string(value).expect("Failed to render config."))
		.expect("Failed to write test config.");

	path
}

fn load_value(value: &Value) -> lore_config::Result<Config> {
	let path = write_temp_config(value);
	let result = lore_config::load(&path);

	fs::remove_file(&path).expect("Failed to remove test config.");

	result
}

#[test]
fn sample_config_loads() {
	let cfg = load_value(&sample_value()).expect("Expected sample config to load.");

	assert_eq!(cfg.indexer, Indexer::Qdrant { wait: true });
	assert_eq!(cfg.workers.attachment_parse.lock_ttl_sec, 120);
	assert_eq!(cfg.parser.allowed_extensions.len(), 6);
}

#[test]
fn empty_worker_ids_are_generated_per_family() {
	let cfg = load_value(&sample_value()).expect("Expected sample config to load.");

	assert!(cfg.workers.entry_index.worker_id.starts_with("entry-index-"));
	assert!(cfg.workers.attachment_parse.worker_id.starts_with("attachment-parse-"));
	assert!(cfg.workers.attachment_index.worker_id.starts_with("attachment-index-"));
	assert_ne!(cfg.workers.entry_index.worker_id, cfg.workers.attachment_index.worker_id);
}

#[test]
fn explicit_worker_id_is_kept() {
	let mut value = sample_value();

	set(&mut value, &["workers", "entry_index", "worker_id"], Value::String(" host-a ".into()));

	let cfg = load_value(&value).expect("Expected config to load.");

	assert_eq!(cfg.workers.entry_index.worker_id, "host-a");
}

#[test]
fn batch_size_must_be_positive() {
	let mut value = sample_value();

	set(&mut value, &["workers", "attachment_index", "batch_size"], Value::Integer(0));

	let err = load_value(&value).expect_err("Expected batch_size validation error.");

	assert!(
		err.to_string().contains("workers.attachment_index.batch_size must be greater than zero."),
		"Unexpected error: {err}"
	);
}

#[test]
fn max_backoff_must_cover_base_backoff() {
	let mut value = sample_value();

	set(&mut value, &["workers", "entry_index", "base_backoff_ms"], Value::Integer(5_000));
	set(&mut value, &["workers", "entry_index", "max_backoff_ms"], Value::Integer(1_000));

	let err = load_value(&value).expect_err("Expected backoff validation error.");

	assert!(
		err.to_string().contains(
			"workers.entry_index.max_backoff_ms must be at least workers.entry_index.base_backoff_ms."
		),
		"Unexpected error: {err}"
	);
}

#[test]
fn parse_lease_must_outlast_parser_timeout() {
	let mut value = sample_value();

	set(&mut value, &["workers", "attachment_parse", "lock_ttl_sec"], Value::Integer(30));
	set(&mut value, &["parser", "timeout_ms"], Value::Integer(60_000));

	let err = load_value(&value).expect_err("Expected lease validation error.");

	assert!(
		err.to_string().contains(
			"workers.attachment_parse.lock_ttl_sec must be longer than parser.timeout_ms (60000 ms)."
		),
		"Unexpected error: {err}"
	);

	set(&mut value, &["workers", "attachment_parse", "enabled"], Value::Boolean(false));

	assert!(load_value(&value).is_ok(), "A disabled parse worker holds no leases.");
}

#[test]
fn index_lease_must_outlast_embedding_timeout() {
	let mut value = sample_value();

	set(&mut value, &["workers", "entry_index", "lock_ttl_sec"], Value::Integer(10));

	let err = load_value(&value).expect_err("Expected lease validation error.");

	assert!(
		err.to_string().contains("workers.entry_index.lock_ttl_sec must be longer than"),
		"Unexpected error: {err}"
	);
}

#[test]
fn missing_parse_worker_section_gets_a_long_lease() {
	let mut value = sample_value();
	let workers = value
		.get_mut("workers")
		.and_then(Value::as_table_mut)
		.expect("Template config must include [workers].");

	workers.remove("attachment_parse");

	let cfg = load_value(&value).expect("Expected config to load.");

	assert_eq!(cfg.workers.attachment_parse.lock_ttl_sec, 120);
}

#[test]
fn embedding_dimensions_must_match_vector_dim() {
	let mut value = sample_value();

	set(&mut value, &["providers", "embedding", "dimensions"], Value::Integer(1_024));

	let err = load_value(&value).expect_err("Expected dimension validation error.");

	assert!(
		err.to_string()
			.contains("providers.embedding.dimensions must match storage.qdrant.vector_dim."),
		"Unexpected error: {err}"
	);
}

#[test]
fn disabled_indexer_skips_backend_validation() {
	let mut value = sample_value();

	set(&mut value, &["indexer"], toml::from_str("backend = \"disabled\"").expect("table"));
	set(&mut value, &["providers", "embedding", "dimensions"], Value::Integer(1_024));

	let cfg = load_value(&value).expect("Expected config to load with disabled indexer.");

	assert_eq!(cfg.indexer, Indexer::Disabled { reason: None });
}

#[test]
fn unrecognized_indexer_section_falls_back_to_disabled() {
	let mut value = sample_value();

	set(
		&mut value,
		&["indexer"],
		toml::from_str("backend = \"elastic\"\nhosts = [\"a\"]").expect("table"),
	);

	let cfg = load_value(&value).expect("Expected config to load.");

	match cfg.indexer {
		Indexer::Disabled { reason: Some(reason) } => {
			assert!(reason.contains("Unrecognized [indexer] section"), "Unexpected reason: {reason}");
		},
		other => panic!("Expected disabled indexer, got {other:?}."),
	}
}

#[test]
fn unknown_indexer_field_falls_back_to_disabled() {
	let mut value = sample_value();

	set(&mut value, &["indexer"], toml::from_str("backend = \"qdrant\"\nshards = 3").expect("table"));

	let cfg = load_value(&value).expect("Expected config to load.");

	assert!(!cfg.indexer.is_enabled());
}

#[test]
fn parser_extensions_are_normalized() {
	let mut value = sample_value();

	set(
		&mut value,
		&["parser", "allowed_extensions"],
		Value::Array(vec![Value::String(".PDF".into()), Value::String(" ".into())]),
	);

	let cfg = load_value(&value).expect("Expected config to load.");

	assert_eq!(cfg.parser.allowed_extensions, vec!["pdf".to_string()]);
}

#[test]
fn missing_config_file_reports_path() {
	let path = env::temp_dir().join("lore_config_missing_file.toml");
	let err = lore_config::load(&path).expect_err("Expected read error.");

	assert!(err.to_string().contains("lore_config_missing_file.toml"), "Unexpected error: {err}");
}
