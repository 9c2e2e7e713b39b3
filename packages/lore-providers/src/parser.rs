//! Text extraction for uploaded attachments.
//!
//! PDFs go through poppler's `pdftotext`; text-like formats are read directly. The extension
//! allow-list is checked before any I/O so unsupported uploads fail immediately and permanently.

use std::{io::ErrorKind, path::Path, time::Duration};

use scraper::Html;
use tokio::{fs, process::Command, time};

use lore_config::Parser;

const NON_CONTENT_ELEMENTS: [&str; 4] = ["script", "style", "noscript", "template"];

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
	#[error("Unsupported file type: {0}")]
	UnsupportedFileType(String),
	#[error("Missing dependency: {0}")]
	MissingDependency(String),
	#[error("Extraction failed: {0}")]
	Extraction(String),
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
}
impl ParseError {
	/// Unsupported types and missing tools will fail the same way on every attempt.
	pub fn is_retryable(&self) -> bool {
		matches!(self, Self::Extraction(_) | Self::Io(_))
	}
}

pub async fn parse(cfg: &Parser, file_path: &Path, content_type: &str) -> Result<String, ParseError> {
	let extension = file_extension(file_path)
		.or_else(|| extension_for_content_type(content_type).map(str::to_string))
		.ok_or_else(|| ParseError::UnsupportedFileType(describe_unknown(content_type)))?;

	if !cfg.allowed_extensions.iter().any(|allowed| allowed == &extension) {
		return Err(ParseError::UnsupportedFileType(extension));
	}

	match extension.as_str() {
		"pdf" => extract_pdf(cfg, file_path).await,
		"html" | "htm" => Ok(strip_markup(&read_lossy(file_path).await?)),
		"txt" | "md" | "markdown" | "csv" | "json" | "log" => read_lossy(file_path).await,
		other => Err(ParseError::MissingDependency(format!("No extractor for .{other} files."))),
	}
}

fn file_extension(path: &Path) -> Option<String> {
	path.extension()
		.and_then(|ext| ext.to_str())
		.map(|ext| ext.trim().to_ascii_lowercase())
		.filter(|ext| !ext.is_empty())
}

fn extension_for_content_type(content_type: &str) -> Option<&'static str> {
	let essence = content_type.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();

	match essence.as_str() {
		"application/pdf" => Some("pdf"),
		"text/plain" => Some("txt"),
		"text/markdown" => Some("md"),
		"text/csv" => Some("csv"),
		"application/json" => Some("json"),
		"text/html" => Some("html"),
		_ => None,
	}
}

fn describe_unknown(content_type: &str) -> String {
	if content_type.trim().is_empty() { "unknown".to_string() } else { content_type.trim().to_string() }
}

async fn read_lossy(path: &Path) -> Result<String, ParseError> {
	let bytes = fs::read(path).await?;

	Ok(String::from_utf8_lossy(&bytes).into_owned())
}

async fn extract_pdf(cfg: &Parser, path: &Path) -> Result<String, ParseError> {
	let mut command = Command::new(&cfg.pdftotext_bin);

	command
		.args(["-enc", "UTF-8", "-l"])
		.arg(cfg.max_pages.max(1).to_string())
		.arg(path)
		.arg("-")
		.kill_on_drop(true);

	let output = match time::timeout(Duration::from_millis(cfg.timeout_ms), command.output()).await
	{
		Ok(Ok(output)) => output,
		Ok(Err(err)) if err.kind() == ErrorKind::NotFound => {
			tracing::warn!(bin = %cfg.pdftotext_bin, "pdftotext binary not found.");

			return Err(ParseError::MissingDependency(format!(
				"{} is not installed or not on PATH.",
				cfg.pdftotext_bin
			)));
		},
		Ok(Err(err)) => {
			tracing::warn!(error = %err, bin = %cfg.pdftotext_bin, "Failed to spawn pdftotext.");

			return Err(ParseError::Io(err));
		},
		Err(_) => {
			tracing::warn!(
				path = %path.display(),
				timeout_ms = cfg.timeout_ms,
				"pdftotext timed out and was killed."
			);

			return Err(ParseError::Extraction(format!(
				"pdftotext timed out after {} ms.",
				cfg.timeout_ms
			)));
		},
	};

	if !output.status.success() {
		let stderr = String::from_utf8_lossy(&output.stderr);

		tracing::warn!(
			path = %path.display(),
			status = %output.status,
			stderr = %stderr.trim(),
			"pdftotext exited with failure."
		);

		return Err(ParseError::Extraction(format!(
			"pdftotext exited with {}: {}",
			output.status,
			stderr.trim()
		)));
	}

	tracing::debug!(path = %path.display(), bytes = output.stdout.len(), "pdftotext finished.");

	Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Visible text of an HTML document, one space between text nodes. Script and style bodies are
/// not content.
fn strip_markup(html: &str) -> String {
	let document = Html::parse_document(html);
	let mut words = Vec::new();

	for node in document.root_element().descendants() {
		let Some(text) = node.value().as_text() else {
			continue;
		};
		let hidden = node.ancestors().any(|ancestor| {
			ancestor.value().as_element().is_some_and(|el| NON_CONTENT_ELEMENTS.contains(&el.name()))
		});

		if !hidden {
			words.extend(text.split_whitespace());
		}
	}

	words.join(" ")
}

#[cfg(test)]
mod tests {
	use std::{
		env,
		path::PathBuf,
		sync::atomic::{AtomicU64, Ordering},
	};

	use super::*;

	fn temp_file(name: &str, contents: &[u8]) -> PathBuf {
		static COUNTER: AtomicU64 = AtomicU64::new(0);

		let ordinal = COUNTER.fetch_add(1, Ordering::SeqCst);
		let dir = env::temp_dir().join(format!("lore_parser_{}_{ordinal}", std::process::id()));

		std::fs::create_dir_all(&dir).expect("Failed to create temp dir.");

		let path = dir.join(name);

		std::fs::write(&path, contents).expect("Failed to write temp file.");

		path
	}

	#[tokio::test]
	async fn rejects_executables_before_reading() {
		let path = PathBuf::from("/nonexistent/setup.exe");
		let err = parse(&Parser::default(), &path, "application/octet-stream")
			.await
			.expect_err("Expected unsupported type.");

		assert!(err.to_string().contains("Unsupported file type"), "Unexpected error: {err}");
		assert!(!err.is_retryable());
	}

	#[tokio::test]
	async fn reads_plain_text() {
		let path = temp_file("notes.TXT", "Day one in Kyoto.".as_bytes());
		let text = parse(&Parser::default(), &path, "text/plain").await.expect("parse failed");

		assert_eq!(text, "Day one in Kyoto.");
	}

	#[tokio::test]
	async fn strips_html_markup() {
		let path = temp_file("page.html", b"<html><body><h1>Kyoto</h1><p>Tea &amp; temples</p></body></html>");
		let text = parse(&Parser::default(), &path, "text/html").await.expect("parse failed");

		assert_eq!(text, "Kyoto Tea & temples");
	}

	#[test]
	fn html_script_and_style_bodies_are_not_text() {
		let html = "<html><head><style>body{color:red}</style></head><body>\
			<script>var apiKey='x';</script><p>Visible</p><noscript>Enable JS</noscript></body></html>";

		assert_eq!(strip_markup(html), "Visible");
	}

	#[test]
	fn bare_less_than_in_html_text_keeps_the_rest() {
		let html = "<p>if a < b then the rest is kept</p><p>Second paragraph</p>";

		assert_eq!(strip_markup(html), "if a < b then the rest is kept Second paragraph");
	}

	#[tokio::test]
	async fn falls_back_to_content_type_without_extension() {
		let path = temp_file("upload", b"plain body");
		let text = parse(&Parser::default(), &path, "text/plain; charset=utf-8")
			.await
			.expect("parse failed");

		assert_eq!(text, "plain body");
	}

	#[tokio::test]
	async fn extension_outside_allow_list_is_rejected() {
		let cfg = Parser { allowed_extensions: vec!["pdf".to_string()], ..Parser::default() };
		let path = temp_file("data.csv", b"a,b");
		let err = parse(&cfg, &path, "text/csv").await.expect_err("Expected rejection.");

		assert!(matches!(err, ParseError::UnsupportedFileType(ref ext) if ext == "csv"));
	}

	#[tokio::test]
	async fn missing_pdftotext_is_not_retryable() {
		let cfg = Parser {
			pdftotext_bin: "lore-test-missing-pdftotext".to_string(),
			..Parser::default()
		};
		let path = temp_file("report.pdf", b"%PDF-1.4\n");
		let err = parse(&cfg, &path, "application/pdf").await.expect_err("Expected failure.");

		assert!(matches!(err, ParseError::MissingDependency(_)), "Unexpected error: {err}");
		assert!(!err.is_retryable());
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn failing_extractor_is_retryable() {
		// `false` ignores its arguments and exits 1, like a pdftotext that choked on the file.
		let cfg = Parser { pdftotext_bin: "false".to_string(), ..Parser::default() };
		let path = temp_file("broken.pdf", b"%PDF-1.4\n");
		let err = parse(&cfg, &path, "application/pdf").await.expect_err("Expected failure.");

		assert!(matches!(err, ParseError::Extraction(ref msg) if msg.contains("exited with")));
		assert!(err.is_retryable());
	}

	#[tokio::test]
	async fn missing_text_file_is_retryable() {
		let path = env::temp_dir().join("lore_parser_missing_file.txt");
		let err = parse(&Parser::default(), &path, "text/plain")
			.await
			.expect_err("Expected I/O failure.");

		assert!(matches!(err, ParseError::Io(_)));
		assert!(err.is_retryable());
	}
}
