use time::Duration;

pub const MAX_ERROR_CHARS: usize = 1_024;

const MAX_BACKOFF_EXPONENT: u32 = 16;
const REDACTED: &str = "[REDACTED]";
const SECRET_KEY_NAMES: [&str; 5] = ["api_key", "apikey", "password", "secret", "token"];

/// Delay before the next attempt after `prior_attempts` failed ones: `base * 2^prior_attempts`,
/// capped at `max_ms`.
pub fn backoff_for_attempt(prior_attempts: i32, base_ms: u64, max_ms: u64) -> Duration {
	let exp = (prior_attempts.max(0) as u32).min(MAX_BACKOFF_EXPONENT);
	let delay = base_ms.saturating_mul(1_u64 << exp).min(max_ms);

	Duration::milliseconds(i64::try_from(delay).unwrap_or(i64::MAX))
}

/// Redacts credential values and truncates, so `last_error` is safe to show operators.
///
/// A value is redacted when it follows `Bearer`, or when it is assigned (`key=value`, `key:value`
/// or `key: value`) to a key naming a secret.
pub fn sanitize_error(text: &str) -> String {
	let mut out = String::with_capacity(text.len().min(MAX_ERROR_CHARS));
	let mut value_follows = false;

	for word in text.split_whitespace() {
		if !out.is_empty() {
			out.push(' ');
		}
		if value_follows {
			out.push_str(REDACTED);

			value_follows = false;

			continue;
		}

		match split_assignment(word) {
			Some((key, sep, value)) if names_secret(key) => {
				out.push_str(key);
				out.push(sep);

				if value.is_empty() {
					value_follows = true;
				} else {
					out.push_str(REDACTED);
				}
			},
			_ => {
				out.push_str(word);

				value_follows = word.eq_ignore_ascii_case("bearer");
			},
		}
	}

	if out.chars().count() > MAX_ERROR_CHARS {
		out = out.chars().take(MAX_ERROR_CHARS).collect();
		out.push_str("...");
	}

	out
}

fn split_assignment(word: &str) -> Option<(&str, char, &str)> {
	let at = word.find(['=', ':'])?;
	let sep = char::from(word.as_bytes()[at]);

	Some((&word[..at], sep, &word[at + 1..]))
}

/// Matches whole key names, so `access_token` is a secret and `max_tokens` is not.
fn names_secret(key: &str) -> bool {
	let key = key
		.trim_matches(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-'))
		.to_ascii_lowercase()
		.replace('-', "_");

	SECRET_KEY_NAMES.iter().any(|name| {
		key == *name || key.strip_suffix(name).is_some_and(|prefix| prefix.ends_with('_'))
	})
}
