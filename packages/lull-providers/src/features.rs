//! Audio feature extraction through an HTTP embedding endpoint.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde_json::Value;

use crate::{Error, Result};

/// Requests the raw embedding for one recording. The provider does not check the dimension.
pub async fn extract(
	cfg: &lull_config::FeatureProviderConfig,
	audio_ref: &str,
) -> Result<Vec<f32>> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = serde_json::json!({
		"model": cfg.model,
		"input": audio_ref,
		"dimensions": cfg.dimensions,
	});
	let res = client
		.post(url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;

	if res.status() == StatusCode::NOT_FOUND {
		return Err(Error::NotFound { message: format!("Audio {audio_ref:?} was not found.") });
	}

	let json: Value = res.error_for_status()?.json().await?;

	parse_feature_response(&json)
}

fn parse_feature_response(json: &Value) -> Result<Vec<f32>> {
	let embedding = json
		.get("data")
		.and_then(Value::as_array)
		.and_then(|data| data.first())
		.and_then(|item| item.get("embedding"))
		.or_else(|| json.get("embedding"))
		.and_then(Value::as_array)
		.ok_or_else(|| Error::invalid_response("Feature response is missing an embedding array."))?;

	embedding
		.iter()
		.map(|value| {
			value
				.as_f64()
				.map(|number| number as f32)
				.ok_or_else(|| Error::invalid_response("Embedding value must be numeric."))
		})
		.collect()
}
