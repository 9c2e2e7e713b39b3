use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct OutboxEvent {
	pub id: Uuid,
	pub subject_id: Uuid,
	pub secondary_id: Option<Uuid>,
	pub op: String,
	pub subject_updated_at: Option<OffsetDateTime>,
	pub status: String,
	pub attempts: i32,
	pub available_at: OffsetDateTime,
	pub locked_at: Option<OffsetDateTime>,
	pub locked_by: Option<String>,
	pub last_error: Option<String>,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct EntryType {
	pub type_id: Uuid,
	pub code: String,
	pub name: String,
	pub graph_enabled: bool,
	pub ai_enabled: bool,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct Entry {
	pub entry_id: Uuid,
	pub type_id: Uuid,
	pub title: String,
	pub summary: Option<String>,
	pub content: String,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct Tag {
	pub tag_id: Uuid,
	pub name: String,
}

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct Attachment {
	pub attachment_id: Uuid,
	pub entry_id: Uuid,
	pub file_name: String,
	pub file_path: String,
	pub content_type: String,
	pub size_bytes: i64,
	pub parse_status: String,
	pub parsed_text: Option<String>,
	pub parse_error: Option<String>,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}
impl Attachment {
	pub fn is_parsed(&self) -> bool {
		self.parse_status == "parsed"
	}
}
