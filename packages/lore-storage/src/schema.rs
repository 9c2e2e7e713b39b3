/// The full bootstrap script with `\ir` includes inlined.
pub fn render_schema() -> String {
	expand_includes(include_str!("../../../sql/init.sql"))
}

fn expand_includes(sql: &str) -> String {
	let mut out = String::new();

	for line in sql.lines() {
		let trimmed = line.trim();

		if let Some(path) = trimmed.strip_prefix("\\ir ") {
			match path.trim() {
				"tables/001_entry_types.sql" =>
					out.push_str(include_str!("../../../sql/tables/001_entry_types.sql")),
				"tables/002_entries.sql" =>
					out.push_str(include_str!("../../../sql/tables/002_entries.sql")),
				"tables/003_tags.sql" => out.push_str(include_str!("../../../sql/tables/003_tags.sql")),
				"tables/004_attachments.sql" =>
					out.push_str(include_str!("../../../sql/tables/004_attachments.sql")),
				"tables/005_entry_index_outbox.sql" =>
					out.push_str(include_str!("../../../sql/tables/005_entry_index_outbox.sql")),
				"tables/006_attachment_parse_outbox.sql" => out
					.push_str(include_str!("../../../sql/tables/006_attachment_parse_outbox.sql")),
				"tables/007_attachment_index_outbox.sql" => out
					.push_str(include_str!("../../../sql/tables/007_attachment_index_outbox.sql")),
				_ => out.push_str(line),
			}
		} else {
			out.push_str(line);
		}

		out.push('\n');
	}

	out
}
