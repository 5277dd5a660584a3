mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Config, FeatureProviderConfig, GenerationProviderConfig, Postgres, Prediction, Providers,
	Qdrant, Service, Standardization, Storage, Worker,
};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	parse(&raw).map_err(|err| match err {
		Error::ParseConfig { source, .. } => Error::ParseConfig { path: path.to_path_buf(), source },
		other => other,
	})
}

pub fn parse(raw: &str) -> Result<Config> {
	let mut cfg: Config = toml::from_str(raw)
		.map_err(|err| Error::ParseConfig { path: Default::default(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.storage.postgres.dsn.trim().is_empty() {
		return Err(Error::invalid("storage.postgres.dsn", "must be non-empty."));
	}
	// A running job keeps one connection for its owner lock.
	if cfg.storage.postgres.pool_max_conns < 2 {
		return Err(Error::invalid("storage.postgres.pool_max_conns", "must be at least 2."));
	}
	if cfg.storage.qdrant.collection.trim().is_empty() {
		return Err(Error::invalid("storage.qdrant.collection", "must be non-empty."));
	}
	if cfg.storage.qdrant.vector_dim == 0 {
		return Err(Error::invalid("storage.qdrant.vector_dim", "must be greater than zero."));
	}
	if cfg.providers.features.dimensions != cfg.storage.qdrant.vector_dim {
		return Err(Error::invalid(
			"providers.features.dimensions",
			"must match storage.qdrant.vector_dim.",
		));
	}
	if !cfg.providers.generation.temperature.is_finite()
		|| !(0.0..=2.0).contains(&cfg.providers.generation.temperature)
	{
		return Err(Error::invalid(
			"providers.generation.temperature",
			"must be a finite number in the range 0.0-2.0.",
		));
	}
	if cfg.providers.generation.max_tokens == 0 {
		return Err(Error::invalid("providers.generation.max_tokens", "must be greater than zero."));
	}

	for (label, key) in [
		("providers.features.api_key", &cfg.providers.features.api_key),
		("providers.generation.api_key", &cfg.providers.generation.api_key),
	] {
		if key.trim().is_empty() {
			return Err(Error::invalid(label, "must be non-empty."));
		}
	}

	for (label, value) in [
		("providers.features.default_headers", &cfg.providers.features.default_headers),
		("providers.generation.default_headers", &cfg.providers.generation.default_headers),
	] {
		if value.values().any(|header| !header.is_string()) {
			return Err(Error::invalid(label, "values must be strings."));
		}
	}

	let epsilon = cfg.standardization.epsilon;

	if !epsilon.is_finite() || epsilon <= 0.0 {
		return Err(Error::invalid(
			"standardization.epsilon",
			"must be a finite number greater than zero.",
		));
	}
	if cfg.standardization.recompute_interval == 0 {
		return Err(Error::invalid(
			"standardization.recompute_interval",
			"must be greater than zero.",
		));
	}
	if cfg.prediction.min_labels == 0 {
		return Err(Error::invalid("prediction.min_labels", "must be greater than zero."));
	}
	if cfg.prediction.top_k == 0 {
		return Err(Error::invalid("prediction.top_k", "must be greater than zero."));
	}
	if cfg.prediction.normal_confidence_labels < cfg.prediction.min_labels {
		return Err(Error::invalid(
			"prediction.normal_confidence_labels",
			"must be greater than or equal to prediction.min_labels.",
		));
	}
	if cfg.worker.poll_interval_ms == 0 {
		return Err(Error::invalid("worker.poll_interval_ms", "must be greater than zero."));
	}
	if cfg.worker.claim_lease_seconds <= 0 {
		return Err(Error::invalid("worker.claim_lease_seconds", "must be greater than zero."));
	}
	if cfg.worker.max_attempts <= 0 {
		return Err(Error::invalid("worker.max_attempts", "must be greater than zero."));
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	for base in [&mut cfg.providers.features.api_base, &mut cfg.providers.generation.api_base] {
		while base.ends_with('/') {
			base.pop();
		}
	}

	if cfg.service.log_level.trim().is_empty() {
		cfg.service.log_level = "info".to_string();
	}
}
