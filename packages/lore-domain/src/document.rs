use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
	Entry,
	Attachment,
}
impl DocumentKind {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Entry => "entry",
			Self::Attachment => "attachment",
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryTypeMeta {
	pub type_id: Uuid,
	pub code: String,
	pub name: String,
	pub graph_enabled: bool,
	pub ai_enabled: bool,
}
impl EntryTypeMeta {
	/// Whether documents of this type may live in the search index at all.
	pub fn indexable(&self) -> bool {
		self.ai_enabled
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRef {
	pub tag_id: Uuid,
	pub name: String,
}

/// Normalized view of an entry or attachment as the index sees it.
///
/// `text` is the only field embedded; the rest travels as point payload so search results can be
/// filtered and rendered without a round trip to Postgres.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentPayload {
	pub subject_id: Uuid,
	pub kind: DocumentKind,
	pub entry_id: Uuid,
	pub entry_type: EntryTypeMeta,
	pub title: String,
	pub summary: Option<String>,
	pub content: String,
	pub tags: Vec<TagRef>,
	pub file_name: Option<String>,
	pub text: String,
}

pub struct EntrySource {
	pub entry_id: Uuid,
	pub entry_type: EntryTypeMeta,
	pub title: String,
	pub summary: Option<String>,
	pub content: String,
	pub tags: Vec<TagRef>,
}

pub struct AttachmentSource {
	pub attachment_id: Uuid,
	pub file_name: String,
	pub parsed_text: String,
	pub entry: EntrySource,
}

/// Renders an entry. Returns `None` when the type is not indexable or nothing is left to embed.
///
/// Layout, sections separated by one blank line and skipped when empty:
/// title, summary, content, `Tags: a, b` (sorted by name).
pub fn render_entry(source: EntrySource) -> Option<DocumentPayload> {
	if !source.entry_type.indexable() {
		return None;
	}

	let mut tags = source.tags;

	tags.sort_by(|a, b| a.name.cmp(&b.name).then(a.tag_id.cmp(&b.tag_id)));

	let tag_line = if tags.is_empty() {
		String::new()
	} else {
		format!("Tags: {}", tags.iter().map(|tag| tag.name.as_str()).collect::<Vec<_>>().join(", "))
	};
	let summary = source.summary.filter(|summary| !summary.trim().is_empty());
	let text = join_sections(&[
		source.title.as_str(),
		summary.as_deref().unwrap_or_default(),
		source.content.as_str(),
		tag_line.as_str(),
	]);

	if text.is_empty() {
		return None;
	}

	Some(DocumentPayload {
		subject_id: source.entry_id,
		kind: DocumentKind::Entry,
		entry_id: source.entry_id,
		entry_type: source.entry_type,
		title: source.title,
		summary,
		content: source.content,
		tags,
		file_name: None,
		text,
	})
}

/// Renders an attachment as `Attachment: <file>` / `Entry: <title>` followed by the extracted
/// text. Returns `None` when the owning type is not indexable or the extracted text is blank.
pub fn render_attachment(source: AttachmentSource) -> Option<DocumentPayload> {
	let AttachmentSource { attachment_id, file_name, parsed_text, entry } = source;

	if !entry.entry_type.indexable() || parsed_text.trim().is_empty() {
		return None;
	}

	let header = format!("Attachment: {}\nEntry: {}", file_name.trim(), entry.title.trim());
	let text = join_sections(&[header.as_str(), parsed_text.as_str()]);

	Some(DocumentPayload {
		subject_id: attachment_id,
		kind: DocumentKind::Attachment,
		entry_id: entry.entry_id,
		entry_type: entry.entry_type,
		title: entry.title,
		summary: None,
		content: parsed_text,
		tags: entry.tags,
		file_name: Some(file_name),
		text,
	})
}

fn join_sections(sections: &[&str]) -> String {
	sections
		.iter()
		.map(|section| section.trim())
		.filter(|section| !section.is_empty())
		.collect::<Vec<_>>()
		.join("\n\n")
}

#[cfg(test)]
mod tests {
	use super::*;

	fn entry_type(ai_enabled: bool) -> EntryTypeMeta {
		EntryTypeMeta {
			type_id: Uuid::nil(),
			code: "journal".to_string(),
			name: "Journal".to_string(),
			graph_enabled: true,
			ai_enabled,
		}
	}

	fn tag(name: &str) -> TagRef {
		TagRef { tag_id: Uuid::new_v4(), name: name.to_string() }
	}

	fn entry(ai_enabled: bool) -> EntrySource {
		EntrySource {
			entry_id: Uuid::new_v4(),
			entry_type: entry_type(ai_enabled),
			title: "Trip to Kyoto".to_string(),
			summary: Some("Temples and tea.".to_string()),
			content: "Visited Fushimi Inari at dawn.".to_string(),
			tags: vec![tag("travel"), tag("japan")],
		}
	}

	#[test]
	fn renders_sections_in_stable_order() {
		let payload = render_entry(entry(true)).expect("Expected payload.");

		assert_eq!(
			payload.text,
			"Trip to Kyoto\n\nTemples and tea.\n\nVisited Fushimi Inari at dawn.\n\nTags: japan, travel"
		);
		assert_eq!(payload.tags[0].name, "japan");
	}

	#[test]
	fn blank_summary_is_skipped() {
		let mut source = entry(true);

		source.summary = Some("   ".to_string());
		source.tags.clear();

		let payload = render_entry(source).expect("Expected payload.");

		assert_eq!(payload.text, "Trip to Kyoto\n\nVisited Fushimi Inari at dawn.");
		assert!(payload.summary.is_none());
	}

	#[test]
	fn disabled_type_renders_nothing() {
		assert!(render_entry(entry(false)).is_none());
	}

	#[test]
	fn empty_entry_renders_nothing() {
		let mut source = entry(true);

		source.title = " ".to_string();
		source.summary = None;
		source.content = String::new();
		source.tags.clear();

		assert!(render_entry(source).is_none());
	}

	#[test]
	fn attachment_carries_owner_context() {
		let owner = entry(true);
		let entry_id = owner.entry_id;
		let attachment_id = Uuid::new_v4();
		let payload = render_attachment(AttachmentSource {
			attachment_id,
			file_name: "itinerary.pdf".to_string(),
			parsed_text: "Day 1: Arashiyama.".to_string(),
			entry: owner,
		})
		.expect("Expected payload.");

		assert_eq!(payload.subject_id, attachment_id);
		assert_eq!(payload.entry_id, entry_id);
		assert_eq!(payload.kind, DocumentKind::Attachment);
		assert_eq!(
			payload.text,
			"Attachment: itinerary.pdf\nEntry: Trip to Kyoto\n\nDay 1: Arashiyama."
		);
	}

	#[test]
	fn attachment_without_text_renders_nothing() {
		let payload = render_attachment(AttachmentSource {
			attachment_id: Uuid::new_v4(),
			file_name: "scan.pdf".to_string(),
			parsed_text: "\n\n".to_string(),
			entry: entry(true),
		});

		assert!(payload.is_none());
	}
}
