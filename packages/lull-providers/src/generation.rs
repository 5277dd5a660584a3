//! Label generation through an OpenAI-compatible chat completion endpoint.

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::{Error, Result};

const MAX_ATTEMPTS: usize = 3;

/// Sends `messages` and returns the JSON object the model produced. Replies whose content is not
/// a JSON object are retried; transport and status errors are returned immediately.
pub async fn generate(
	cfg: &lull_config::GenerationProviderConfig,
	messages: &[Value],
) -> Result<Value> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = serde_json::json!({
		"model": cfg.model,
		"temperature": cfg.temperature,
		"max_tokens": cfg.max_tokens,
		"response_format": { "type": "json_object" },
		"messages": messages,
	});

	for attempt in 1..=MAX_ATTEMPTS {
		let res = client
			.post(&url)
			.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
			.json(&body)
			.send()
			.await?;
		let json: Value = res.error_for_status()?.json().await?;

		match parse_completion_json(&json) {
			Ok(parsed) => return Ok(parsed),
			Err(err) => {
				tracing::warn!(attempt, error = %err, "Generation reply is not a JSON object.");
			},
		}
	}

	Err(Error::invalid_response(format!(
		"Generation reply was not a JSON object after {MAX_ATTEMPTS} attempts."
	)))
}

fn parse_completion_json(json: &Value) -> Result<Value> {
	let content = json
		.get("choices")
		.and_then(Value::as_array)
		.and_then(|choices| choices.first())
		.and_then(|choice| choice.get("message"))
		.and_then(|message| message.get("content"))
		.and_then(Value::as_str)
		.ok_or_else(|| Error::invalid_response("Completion is missing message content."))?;
	let parsed: Value = serde_json::from_str(strip_code_fence(content))
		.map_err(|_| Error::invalid_response("Completion content is not valid JSON."))?;

	if !parsed.is_object() {
		return Err(Error::invalid_response("Completion content is not a JSON object."));
	}

	Ok(parsed)
}

fn strip_code_fence(content: &str) -> &str {
	let trimmed = content.trim();
	let Some(inner) = trimmed.strip_prefix("```") else {
		return trimmed;
	};
	let inner = inner.strip_prefix("json").unwrap_or(inner);

	inner.strip_suffix("```").unwrap_or(inner).trim()
}
