//! Token-bounded chunking of subject text for the vector index.
//!
//! Text is cut at sentence boundaries and packed into chunks of at most `max_tokens`. Consecutive
//! chunks share whole trailing sentences worth up to `overlap_tokens`. Every chunk carries a point
//! id derived from its subject and position, so re-indexing a subject overwrites its points.

use std::collections::VecDeque;

pub use tokenizers::Tokenizer;

use unicode_segmentation::UnicodeSegmentation;
use uuid::Uuid;

pub type TokenizerError = tokenizers::Error;

#[derive(Clone, Debug)]
pub struct ChunkingConfig {
	pub max_tokens: u32,
	pub overlap_tokens: u32,
}

/// One indexable slice of a subject. Offsets are byte offsets into the subject text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubjectChunk {
	pub chunk_id: Uuid,
	pub chunk_index: i32,
	pub start_offset: usize,
	pub end_offset: usize,
	pub text: String,
}

#[derive(Clone, Copy, Debug)]
struct Span {
	start: usize,
	end: usize,
	tokens: usize,
}

pub fn load_tokenizer(repo: &str) -> Result<Tokenizer, TokenizerError> {
	Tokenizer::from_pretrained(repo, None)
}

pub fn chunk_id_for(subject_id: Uuid, chunk_index: i32) -> Uuid {
	Uuid::new_v5(&Uuid::NAMESPACE_OID, format!("{subject_id}:{chunk_index}").as_bytes())
}

/// Splits `text` into chunks for `subject_id`. Blank text yields no chunks.
///
/// Token counts are summed per sentence, which can differ slightly from encoding the joined text
/// at once. A sentence longer than the budget is split at word boundaries.
pub fn chunk_subject(
	subject_id: Uuid,
	text: &str,
	cfg: &ChunkingConfig,
	tokenizer: &Tokenizer,
) -> Vec<SubjectChunk> {
	let max_tokens = cfg.max_tokens.max(1) as usize;
	let overlap_tokens = (cfg.overlap_tokens as usize).min(max_tokens - 1);
	let mut chunks = Vec::new();
	let mut window = VecDeque::new();
	let mut window_tokens = 0_usize;

	for span in spans(text, max_tokens, tokenizer) {
		if !window.is_empty() && window_tokens + span.tokens > max_tokens {
			emit(&mut chunks, subject_id, text, &window);

			window_tokens = keep_overlap(&mut window, overlap_tokens);

			while window_tokens + span.tokens > max_tokens {
				let Some(dropped) = window.pop_front() else {
					break;
				};

				window_tokens -= dropped.tokens;
			}
		}

		window_tokens += span.tokens;

		window.push_back(span);
	}

	if !window.is_empty() {
		emit(&mut chunks, subject_id, text, &window);
	}

	chunks
}

fn spans(text: &str, max_tokens: usize, tokenizer: &Tokenizer) -> Vec<Span> {
	let mut spans = Vec::new();

	for (start, sentence) in text.split_sentence_bound_indices() {
		let tokens = count_tokens(sentence, tokenizer);

		if tokens <= max_tokens {
			spans.push(Span { start, end: start + sentence.len(), tokens });

			continue;
		}

		for (offset, word) in sentence.split_word_bound_indices() {
			let word_start = start + offset;

			spans.push(Span {
				start: word_start,
				end: word_start + word.len(),
				tokens: count_tokens(word, tokenizer),
			});
		}
	}

	spans
}

fn count_tokens(text: &str, tokenizer: &Tokenizer) -> usize {
	match tokenizer.encode(text, false) {
		Ok(encoding) => encoding.len(),
		Err(err) => {
			tracing::warn!(error = %err, "Tokenizer failed. Counting words instead.");

			text.split_whitespace().count()
		},
	}
}

/// Drops everything but the longest tail of the window that fits in `overlap_tokens`. Returns the
/// tokens kept.
fn keep_overlap(window: &mut VecDeque<Span>, overlap_tokens: usize) -> usize {
	if overlap_tokens == 0 {
		window.clear();

		return 0;
	}

	let mut kept = 0_usize;
	let mut keep_from = window.len();

	while keep_from > 0 && kept + window[keep_from - 1].tokens <= overlap_tokens {
		keep_from -= 1;
		kept += window[keep_from].tokens;
	}

	window.drain(..keep_from);

	kept
}

fn emit(chunks: &mut Vec<SubjectChunk>, subject_id: Uuid, text: &str, window: &VecDeque<Span>) {
	let (Some(first), Some(last)) = (window.front(), window.back()) else {
		return;
	};
	let slice = &text[first.start..last.end];

	if slice.trim().is_empty() {
		return;
	}

	let chunk_index = i32::try_from(chunks.len()).unwrap_or(i32::MAX);

	chunks.push(SubjectChunk {
		chunk_id: chunk_id_for(subject_id, chunk_index),
		chunk_index,
		start_offset: first.start,
		end_offset: last.end,
		text: slice.to_string(),
	});
}
