pub mod document;
pub mod retry;

pub use document::{
	AttachmentSource, DocumentKind, DocumentPayload, EntrySource, EntryTypeMeta, TagRef,
	render_attachment, render_entry,
};
