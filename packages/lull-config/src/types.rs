use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	#[serde(default)]
	pub standardization: Standardization,
	#[serde(default)]
	pub prediction: Prediction,
	#[serde(default)]
	pub worker: Worker,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Service {
	pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
	pub qdrant: Qdrant,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Qdrant {
	pub url: String,
	pub collection: String,
	/// Dimension of every raw and standardized vector in the system.
	pub vector_dim: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Providers {
	pub features: FeatureProviderConfig,
	pub generation: GenerationProviderConfig,
}

/// Remote feature extractor that turns an audio reference into a raw embedding.
#[derive(Debug, Clone, Deserialize)]
pub struct FeatureProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

/// OpenAI-compatible chat completion endpoint used for label generation.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerationProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub temperature: f32,
	#[serde(default = "default_max_tokens")]
	pub max_tokens: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Standardization {
	pub epsilon: f64,
	/// Statistics are recomputed each time an owner's embedded item count reaches a multiple of
	/// this value.
	pub recompute_interval: u32,
}
impl Default for Standardization {
	fn default() -> Self {
		Self { epsilon: 1e-8, recompute_interval: 5 }
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Prediction {
	pub min_labels: u32,
	pub top_k: u32,
	pub normal_confidence_labels: u32,
}
impl Default for Prediction {
	fn default() -> Self {
		Self { min_labels: 5, top_k: 3, normal_confidence_labels: 10 }
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Worker {
	pub poll_interval_ms: u64,
	pub claim_lease_seconds: i64,
	pub max_attempts: i32,
}
impl Default for Worker {
	fn default() -> Self {
		Self { poll_interval_ms: 500, claim_lease_seconds: 120, max_attempts: 5 }
	}
}

fn default_max_tokens() -> u32 {
	200
}
