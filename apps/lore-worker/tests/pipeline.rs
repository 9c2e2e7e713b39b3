use std::{
	env,
	path::{Path, PathBuf},
	process::Command,
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration as StdDuration,
};

use tokio::{sync::watch, time as tokio_time};
use uuid::Uuid;

use lore_config::{Parser, Postgres, WorkerConfig};
use lore_domain::DocumentPayload;
use lore_index::{BoxFuture, IndexBackend, IndexError, Indexer, memory::MemoryBackend};
use lore_service::{AddAttachmentRequest, CreateEntryRequest, CreateEntryTypeRequest, LoreService};
use lore_storage::{
	db::Db,
	models::OutboxEvent,
	outbox::{self, OutboxFamily, StatusCounts},
	queries,
};
use lore_testkit::TestDatabase;
use lore_worker::worker::{self, WorkerState};

struct Pipeline {
	test_db: TestDatabase,
	service: LoreService,
	state: Arc<WorkerState>,
	backend: Arc<MemoryBackend>,
	cfg: WorkerConfig,
}
impl Pipeline {
	async fn drain(&self, family: OutboxFamily) -> usize {
		worker::process_batch(&self.state, family, &self.cfg).await.expect("Failed to process batch.")
	}

	async fn counts(&self, family: OutboxFamily) -> StatusCounts {
		outbox::counts_by_status(&self.service.db.pool, family).await.expect("Failed to count rows.")
	}

	async fn rows(&self, family: OutboxFamily) -> Vec<OutboxEvent> {
		let sql = format!("SELECT * FROM {} ORDER BY created_at", family.table());

		sqlx::query_as::<_, OutboxEvent>(&sql)
			.fetch_all(&self.service.db.pool)
			.await
			.expect("Failed to read outbox rows.")
	}

	async fn journal(&self, ai_enabled: bool) -> Uuid {
		self.service
			.create_entry_type(CreateEntryTypeRequest {
				code: format!("journal-{}", Uuid::new_v4().simple()),
				name: "Journal".to_string(),
				graph_enabled: true,
				ai_enabled,
			})
			.await
			.expect("Failed to create entry type.")
			.type_id
	}

	async fn kyoto(&self, type_id: Uuid) -> Uuid {
		self.service
			.create_entry(CreateEntryRequest {
				type_id,
				title: "Trip to Kyoto".to_string(),
				summary: Some("Temples and tea.".to_string()),
				content: "Visited Fushimi Inari at dawn.".to_string(),
				tags: vec!["travel".to_string(), "japan".to_string()],
			})
			.await
			.expect("Failed to create entry.")
			.entry_id
	}

	async fn attach(&self, entry_id: Uuid, path: &Path, content_type: &str) -> Uuid {
		let file_name = path
			.file_name()
			.and_then(|name| name.to_str())
			.expect("Attachment path has a file name.")
			.to_string();

		self.service
			.add_attachment(AddAttachmentRequest {
				entry_id,
				file_name,
				file_path: path.to_string_lossy().into_owned(),
				content_type: content_type.to_string(),
				size_bytes: 0,
			})
			.await
			.expect("Failed to add attachment.")
			.attachment_id
	}
}

/// Memory backend that sleeps before every call and panics on the first `panics` upserts.
struct FaultyBackend {
	inner: Arc<MemoryBackend>,
	delay: StdDuration,
	panics: AtomicUsize,
}
impl IndexBackend for FaultyBackend {
	fn name(&self) -> &'static str {
		"faulty"
	}

	fn upsert<'a>(&'a self, payload: &'a DocumentPayload) -> BoxFuture<'a, Result<(), IndexError>> {
		Box::pin(async move {
			tokio_time::sleep(self.delay).await;

			let should_panic =
				self.panics.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));

			if should_panic.is_ok() {
				panic!("Index backend blew up mid-upsert.");
			}

			self.inner.upsert(payload).await
		})
	}

	fn delete<'a>(&'a self, subject_id: Uuid) -> BoxFuture<'a, Result<(), IndexError>> {
		Box::pin(async move {
			tokio_time::sleep(self.delay).await;

			self.inner.delete(subject_id).await
		})
	}
}

async fn setup(parser: Parser) -> Option<Pipeline> {
	setup_with(parser, |backend| backend).await
}

async fn setup_faulty(delay: StdDuration, panics: usize) -> Option<Pipeline> {
	setup_with(Parser::default(), |inner| {
		Arc::new(FaultyBackend { inner, delay, panics: AtomicUsize::new(panics) })
	})
	.await
}

async fn setup_with<F>(parser: Parser, wrap: F) -> Option<Pipeline>
where
	F: FnOnce(Arc<MemoryBackend>) -> Arc<dyn IndexBackend>,
{
	let base_dsn = lore_testkit::env_dsn()?;
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let cfg = Postgres { dsn: test_db.dsn().to_string(), pool_max_conns: 2 };
	let service_db = Db::connect(&cfg).await.expect("Failed to connect to Postgres.");

	service_db.ensure_schema().await.expect("Failed to ensure schema.");

	let worker_db = Db::connect(&cfg).await.expect("Failed to connect to Postgres.");
	let backend = Arc::new(MemoryBackend::new());
	let state = Arc::new(WorkerState {
		db: worker_db,
		indexer: Indexer::new(wrap(backend.clone())),
		parser,
	});
	let cfg = WorkerConfig { worker_id: "pipeline-test".to_string(), ..WorkerConfig::default() };

	Some(Pipeline { test_db, service: LoreService::new(service_db), state, backend, cfg })
}

fn temp_file(name: &str, contents: &[u8]) -> PathBuf {
	let dir = env::temp_dir().join(format!("lore_pipeline_{}", Uuid::new_v4().simple()));

	std::fs::create_dir_all(&dir).expect("Failed to create temp dir.");

	let path = dir.join(name);

	std::fs::write(&path, contents).expect("Failed to write temp file.");

	path
}

// Single-page PDF with one line of Helvetica text and a correct xref table.
fn minimal_pdf(text: &str) -> Vec<u8> {
	let stream = format!("BT /F1 24 Tf 72 700 Td ({text}) Tj ET");
	let objects = [
		"<< /Type /Catalog /Pages 2 0 R >>".to_string(),
		"<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
		"<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R \
		 /Resources << /Font << /F1 5 0 R >> >> >>"
			.to_string(),
		format!("<< /Length {} >>\nstream\n{stream}\nendstream", stream.len()),
		"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
	];
	let mut out = String::from("%PDF-1.4\n");
	let mut offsets = Vec::new();

	for (idx, body) in objects.iter().enumerate() {
		offsets.push(out.len());
		out.push_str(&format!("{} 0 obj\n{body}\nendobj\n", idx + 1));
	}

	let xref_at = out.len();

	out.push_str(&format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1));

	for offset in offsets {
		out.push_str(&format!("{offset:010} 00000 n \n"));
	}

	out.push_str(&format!(
		"trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_at}\n%%EOF\n",
		objects.len() + 1
	));

	out.into_bytes()
}

fn pdftotext_available() -> bool {
	Command::new("pdftotext").arg("-v").output().is_ok()
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set LORE_PG_DSN to run."]
async fn kyoto_entry_is_indexed_once_and_its_row_removed() {
	let Some(pipeline) = setup(Parser::default()).await else {
		eprintln!("Skipping kyoto_entry_is_indexed_once_and_its_row_removed; set LORE_PG_DSN to run.");

		return;
	};
	let type_id = pipeline.journal(true).await;
	let entry_id = pipeline.kyoto(type_id).await;

	assert_eq!(pipeline.drain(OutboxFamily::EntryIndex).await, 1);

	let doc = pipeline.backend.get(entry_id).expect("Expected indexed entry.");

	assert_eq!(
		doc.text,
		"Trip to Kyoto\n\nTemples and tea.\n\nVisited Fushimi Inari at dawn.\n\nTags: japan, travel"
	);
	assert!(doc.entry_type.graph_enabled);
	assert_eq!(pipeline.counts(OutboxFamily::EntryIndex).await, StatusCounts::default());

	pipeline.service.reindex_all().await.expect("Failed to reindex.");

	assert_eq!(pipeline.drain(OutboxFamily::EntryIndex).await, 1);
	assert_eq!(pipeline.backend.len(), 1);
	assert_eq!(pipeline.backend.get(entry_id), Some(doc));

	pipeline.test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set LORE_PG_DSN to run."]
async fn disabling_ai_retracts_indexed_entries() {
	let Some(pipeline) = setup(Parser::default()).await else {
		eprintln!("Skipping disabling_ai_retracts_indexed_entries; set LORE_PG_DSN to run.");

		return;
	};
	let type_id = pipeline.journal(true).await;
	let entry_id = pipeline.kyoto(type_id).await;

	pipeline.drain(OutboxFamily::EntryIndex).await;

	assert!(pipeline.backend.contains(entry_id));

	pipeline
		.service
		.set_entry_type_flags(type_id, true, false)
		.await
		.expect("Failed to set flags.");

	assert_eq!(pipeline.drain(OutboxFamily::EntryIndex).await, 1);
	assert!(!pipeline.backend.contains(entry_id));
	assert_eq!(pipeline.backend.delete_calls(), 1);
	assert_eq!(pipeline.counts(OutboxFamily::EntryIndex).await, StatusCounts::default());

	pipeline.test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set LORE_PG_DSN to run."]
async fn entry_of_disabled_type_is_never_indexed() {
	let Some(pipeline) = setup(Parser::default()).await else {
		eprintln!("Skipping entry_of_disabled_type_is_never_indexed; set LORE_PG_DSN to run.");

		return;
	};
	let type_id = pipeline.journal(false).await;
	let entry_id = pipeline.kyoto(type_id).await;

	assert_eq!(pipeline.drain(OutboxFamily::EntryIndex).await, 1);
	assert!(!pipeline.backend.contains(entry_id));
	assert_eq!(pipeline.backend.upsert_calls(), 0);
	assert_eq!(pipeline.counts(OutboxFamily::EntryIndex).await, StatusCounts::default());

	pipeline.test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set LORE_PG_DSN to run."]
async fn text_attachment_is_parsed_then_indexed() {
	let Some(pipeline) = setup(Parser::default()).await else {
		eprintln!("Skipping text_attachment_is_parsed_then_indexed; set LORE_PG_DSN to run.");

		return;
	};
	let type_id = pipeline.journal(true).await;
	let entry_id = pipeline.kyoto(type_id).await;
	let path = temp_file("notes.txt", b"Day 1: Arashiyama bamboo grove.");
	let attachment_id = pipeline.attach(entry_id, &path, "text/plain").await;

	assert_eq!(pipeline.drain(OutboxFamily::AttachmentParse).await, 1);
	assert_eq!(pipeline.counts(OutboxFamily::AttachmentParse).await, StatusCounts::default());

	let attachment = queries::fetch_attachment(&pipeline.service.db.pool, attachment_id)
		.await
		.expect("Failed to fetch attachment.")
		.expect("Attachment exists.");

	assert_eq!(attachment.parse_status, "parsed");
	assert_eq!(attachment.parsed_text.as_deref(), Some("Day 1: Arashiyama bamboo grove."));

	let index_rows = pipeline.rows(OutboxFamily::AttachmentIndex).await;

	assert_eq!(index_rows.len(), 1);
	assert_eq!(index_rows[0].secondary_id, Some(entry_id));
	assert_eq!(pipeline.drain(OutboxFamily::AttachmentIndex).await, 1);

	let doc = pipeline.backend.get(attachment_id).expect("Expected indexed attachment.");

	assert_eq!(doc.entry_id, entry_id);
	assert_eq!(
		doc.text,
		"Attachment: notes.txt\nEntry: Trip to Kyoto\n\nDay 1: Arashiyama bamboo grove."
	);

	pipeline.test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set LORE_PG_DSN to run."]
async fn pdf_attachment_is_extracted_with_pdftotext() {
	if !pdftotext_available() {
		eprintln!("Skipping pdf_attachment_is_extracted_with_pdftotext; pdftotext is not installed.");

		return;
	}

	let Some(pipeline) = setup(Parser::default()).await else {
		eprintln!("Skipping pdf_attachment_is_extracted_with_pdftotext; set LORE_PG_DSN to run.");

		return;
	};
	let type_id = pipeline.journal(true).await;
	let entry_id = pipeline.kyoto(type_id).await;
	let path = temp_file("itinerary.pdf", &minimal_pdf("Kyoto itinerary"));
	let attachment_id = pipeline.attach(entry_id, &path, "application/pdf").await;

	pipeline.drain(OutboxFamily::AttachmentParse).await;
	pipeline.drain(OutboxFamily::AttachmentIndex).await;

	let doc = pipeline.backend.get(attachment_id).expect("Expected indexed attachment.");

	assert!(doc.text.contains("Kyoto itinerary"), "Unexpected text: {}", doc.text);

	pipeline.test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set LORE_PG_DSN to run."]
async fn executable_attachment_is_dead_lettered_on_first_attempt() {
	let Some(pipeline) = setup(Parser::default()).await else {
		eprintln!("Skipping executable_attachment_is_dead_lettered_on_first_attempt; set LORE_PG_DSN to run.");

		return;
	};
	let type_id = pipeline.journal(true).await;
	let entry_id = pipeline.kyoto(type_id).await;
	let attachment_id =
		pipeline
		.attach(entry_id, Path::new("/srv/uploads/setup.exe"), "application/octet-stream")
		.await;

	assert_eq!(pipeline.drain(OutboxFamily::AttachmentParse).await, 1);

	let dead = outbox::list_dead(&pipeline.service.db.pool, OutboxFamily::AttachmentParse, 10)
		.await
		.expect("Failed to list dead rows.");

	assert_eq!(dead.len(), 1);
	assert_eq!(dead[0].attempts, 1);
	assert!(
		dead[0].last_error.as_deref().unwrap_or_default().contains("Unsupported file type"),
		"Unexpected error: {:?}",
		dead[0].last_error
	);

	let attachment = queries::fetch_attachment(&pipeline.service.db.pool, attachment_id)
		.await
		.expect("Failed to fetch attachment.")
		.expect("Attachment exists.");

	assert_eq!(attachment.parse_status, "failed");
	assert!(attachment.parse_error.is_some());
	assert!(pipeline.rows(OutboxFamily::AttachmentIndex).await.is_empty());

	pipeline.test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set LORE_PG_DSN to run."]
async fn missing_extractor_dead_letters_the_parse() {
	let parser = Parser { pdftotext_bin: "lore-test-missing-pdftotext".to_string(), ..Parser::default() };
	let Some(pipeline) = setup(parser).await else {
		eprintln!("Skipping missing_extractor_dead_letters_the_parse; set LORE_PG_DSN to run.");

		return;
	};
	let type_id = pipeline.journal(true).await;
	let entry_id = pipeline.kyoto(type_id).await;
	let path = temp_file("scan.pdf", &minimal_pdf("Scanned"));

	pipeline.attach(entry_id, &path, "application/pdf").await;
	pipeline.drain(OutboxFamily::AttachmentParse).await;

	let counts = pipeline.counts(OutboxFamily::AttachmentParse).await;

	assert_eq!(counts.dead, 1);
	assert_eq!(counts.pending, 0);

	pipeline.test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set LORE_PG_DSN to run."]
async fn index_failures_follow_the_retry_policy() {
	let Some(pipeline) = setup(Parser::default()).await else {
		eprintln!("Skipping index_failures_follow_the_retry_policy; set LORE_PG_DSN to run.");

		return;
	};
	let type_id = pipeline.journal(true).await;
	let entry_id = pipeline.kyoto(type_id).await;

	pipeline.backend.fail_next(IndexError::transient("connection reset"));

	assert_eq!(pipeline.drain(OutboxFamily::EntryIndex).await, 1);

	let rows = pipeline.rows(OutboxFamily::EntryIndex).await;

	assert_eq!(rows.len(), 1);
	assert_eq!(rows[0].status, "pending");
	assert_eq!(rows[0].attempts, 1);
	assert!(rows[0].available_at > rows[0].updated_at);
	assert!(rows[0].last_error.as_deref().unwrap_or_default().starts_with("transient:"));
	assert!(!pipeline.backend.contains(entry_id));
	// Backoff keeps the row out of the next claim.
	assert_eq!(pipeline.drain(OutboxFamily::EntryIndex).await, 0);

	let second = pipeline.kyoto(type_id).await;

	pipeline.backend.fail_next(IndexError::config("collection missing"));

	assert_eq!(pipeline.drain(OutboxFamily::EntryIndex).await, 1);

	let dead = outbox::list_dead(&pipeline.service.db.pool, OutboxFamily::EntryIndex, 10)
		.await
		.expect("Failed to list dead rows.");

	assert_eq!(dead.len(), 1);
	assert_eq!(dead[0].subject_id, second);
	assert_eq!(dead[0].attempts, 1);

	outbox::requeue_dead(
		&pipeline.service.db.pool,
		OutboxFamily::EntryIndex,
		dead[0].id,
		time::OffsetDateTime::now_utc(),
	)
	.await
	.expect("Failed to requeue.");

	assert_eq!(pipeline.drain(OutboxFamily::EntryIndex).await, 1);
	assert!(pipeline.backend.contains(second));

	pipeline.test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set LORE_PG_DSN to run."]
async fn panicking_handler_costs_only_its_row_one_attempt() {
	let Some(pipeline) = setup_faulty(StdDuration::ZERO, 1).await else {
		eprintln!("Skipping panicking_handler_costs_only_its_row_one_attempt; set LORE_PG_DSN to run.");

		return;
	};
	let type_id = pipeline.journal(true).await;

	pipeline.kyoto(type_id).await;
	pipeline.kyoto(type_id).await;

	assert_eq!(pipeline.drain(OutboxFamily::EntryIndex).await, 2);
	assert_eq!(pipeline.backend.len(), 1, "The row after the panic must still be handled.");

	let rows = pipeline.rows(OutboxFamily::EntryIndex).await;

	assert_eq!(rows.len(), 1);
	assert_eq!(rows[0].status, "pending");
	assert_eq!(rows[0].attempts, 1);
	assert!(rows[0].locked_by.is_none());

	let last_error = rows[0].last_error.as_deref().unwrap_or_default();

	assert!(last_error.starts_with("unknown:"), "Unexpected error: {last_error}");
	assert!(last_error.contains("panicked"), "Unexpected error: {last_error}");

	pipeline.test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set LORE_PG_DSN to run."]
async fn slow_batch_keeps_its_later_rows_leased() {
	let Some(pipeline) = setup_faulty(StdDuration::from_millis(700), 0).await else {
		eprintln!("Skipping slow_batch_keeps_its_later_rows_leased; set LORE_PG_DSN to run.");

		return;
	};
	let type_id = pipeline.journal(true).await;

	pipeline.kyoto(type_id).await;
	pipeline.kyoto(type_id).await;

	// Each row fits in the lease, the whole batch does not.
	let cfg = WorkerConfig { lock_ttl_sec: 1, batch_size: 2, ..pipeline.cfg.clone() };
	let state = pipeline.state.clone();
	let worker_a = tokio::spawn(async move {
		worker::process_batch(&state, OutboxFamily::EntryIndex, &cfg).await
	});

	tokio_time::sleep(StdDuration::from_millis(1_150)).await;

	let stolen = outbox::claim_batch(
		&pipeline.service.db.pool,
		OutboxFamily::EntryIndex,
		"worker-b",
		2,
		time::Duration::seconds(1),
		time::OffsetDateTime::now_utc(),
	)
	.await
	.expect("Failed to claim.");

	assert!(stolen.is_empty(), "A healthy worker's batch was reclaimed: {} row(s).", stolen.len());

	let claimed = worker_a.await.expect("Worker task failed.").expect("Failed to process batch.");

	assert_eq!(claimed, 2);
	assert_eq!(pipeline.backend.upsert_calls(), 2);
	assert_eq!(pipeline.backend.len(), 2);
	assert_eq!(pipeline.counts(OutboxFamily::EntryIndex).await, StatusCounts::default());

	pipeline.test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set LORE_PG_DSN to run."]
async fn poll_loop_drains_full_batches_back_to_back_and_stops_on_shutdown() {
	let Some(pipeline) = setup(Parser::default()).await else {
		eprintln!(
			"Skipping poll_loop_drains_full_batches_back_to_back_and_stops_on_shutdown; set LORE_PG_DSN to run."
		);

		return;
	};
	let type_id = pipeline.journal(true).await;

	for _ in 0..3 {
		pipeline.kyoto(type_id).await;
	}

	// A one-row batch is always full, so only an immediate reclaim gets through all three rows
	// before the first idle period ends.
	let cfg = WorkerConfig { batch_size: 1, poll_interval_ms: 60_000, ..pipeline.cfg.clone() };
	let (shutdown_tx, shutdown_rx) = watch::channel(false);
	let task = tokio::spawn(worker::run_family(
		pipeline.state.clone(),
		OutboxFamily::EntryIndex,
		cfg,
		shutdown_rx,
	));
	let drained = tokio_time::timeout(StdDuration::from_secs(10), async {
		while pipeline.backend.len() < 3 {
			tokio_time::sleep(StdDuration::from_millis(25)).await;
		}
	})
	.await;

	assert!(drained.is_ok(), "Only {} of 3 entries were indexed.", pipeline.backend.len());
	assert_eq!(pipeline.counts(OutboxFamily::EntryIndex).await, StatusCounts::default());

	shutdown_tx.send(true).expect("Worker dropped its shutdown receiver.");
	tokio_time::timeout(StdDuration::from_secs(5), task)
		.await
		.expect("Worker did not stop on shutdown.")
		.expect("Worker task failed.");

	pipeline.test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set LORE_PG_DSN to run."]
async fn disabled_family_never_claims() {
	let Some(pipeline) = setup(Parser::default()).await else {
		eprintln!("Skipping disabled_family_never_claims; set LORE_PG_DSN to run.");

		return;
	};
	let type_id = pipeline.journal(true).await;

	pipeline.kyoto(type_id).await;

	let cfg = WorkerConfig { enabled: false, poll_interval_ms: 50, ..pipeline.cfg.clone() };
	let (shutdown_tx, shutdown_rx) = watch::channel(false);
	let task = tokio::spawn(worker::run_family(
		pipeline.state.clone(),
		OutboxFamily::EntryIndex,
		cfg,
		shutdown_rx,
	));

	tokio_time::sleep(StdDuration::from_millis(300)).await;

	let rows = pipeline.rows(OutboxFamily::EntryIndex).await;

	assert_eq!(rows.len(), 1);
	assert_eq!(rows[0].status, "pending");
	assert_eq!(rows[0].attempts, 0);
	assert_eq!(pipeline.backend.upsert_calls(), 0);

	shutdown_tx.send(true).expect("Worker dropped its shutdown receiver.");
	tokio_time::timeout(StdDuration::from_secs(5), task)
		.await
		.expect("Worker did not stop on shutdown.")
		.expect("Worker task failed.");

	pipeline.test_db.cleanup().await.expect("Failed to cleanup test database.");
}
