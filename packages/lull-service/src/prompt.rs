//! Generation prompt assembly and reply parsing.

use serde_json::Value;

use crate::stores::GeneratedLabel;

pub const MAX_NOTES_CHARS: usize = 500;

const SYSTEM_PROMPT: &str = "\
You label baby cry recordings for one family. You are given earlier recordings from the same \
family that sound most alike, each with the reason a parent confirmed and what helped.

Reply with a JSON object with these keys:
- \"label\": the most likely reason for the new cry in two to five words.
- \"resolution\": one practical sentence on what to try.
- \"notes\": optional, one short sentence with anything else worth knowing.";

/// A labeled neighbor as it appears in the prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoricalContext {
	pub label: String,
	pub resolution: Option<String>,
	pub notes: Option<String>,
	pub similarity: f32,
}

/// Renders neighbors in the order given, which callers keep at descending similarity.
pub fn render_context(history: &[HistoricalContext]) -> String {
	let mut out = String::from("Most similar earlier recordings:\n");

	for (position, entry) in history.iter().enumerate() {
		out.push_str(&format!(
			"{}. Label: {}; Resolution: {}; Notes: {}; Similarity: {:.2}\n",
			position + 1,
			entry.label,
			entry.resolution.as_deref().unwrap_or("none"),
			entry.notes.as_deref().filter(|notes| !notes.trim().is_empty()).unwrap_or("none"),
			entry.similarity,
		));
	}

	out.push_str("\nPredict the reason for the new recording and what to try.");

	out
}

pub fn build_messages(history: &[HistoricalContext], image_url: Option<&str>) -> Vec<Value> {
	let context = render_context(history);
	let user = match image_url {
		Some(url) => serde_json::json!({
			"role": "user",
			"content": [
				{ "type": "text", "text": context },
				{ "type": "image_url", "image_url": { "url": url } },
			],
		}),
		None => serde_json::json!({ "role": "user", "content": context }),
	};

	vec![serde_json::json!({ "role": "system", "content": SYSTEM_PROMPT }), user]
}

/// Accepts a reply only when `label` and `resolution` are non-blank strings. Notes are optional
/// and cut to [`MAX_NOTES_CHARS`].
pub fn parse_generated_label(reply: &Value) -> Option<GeneratedLabel> {
	let field = |key: &str| {
		reply
			.get(key)
			.and_then(Value::as_str)
			.map(str::trim)
			.filter(|value| !value.is_empty())
			.map(str::to_string)
	};
	let label = field("label")?;
	let resolution = field("resolution")?;
	let notes = field("notes").map(|notes| notes.chars().take(MAX_NOTES_CHARS).collect());

	Some(GeneratedLabel { label, resolution, notes })
}
