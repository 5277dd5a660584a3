//! Retrieval-grounded label prediction for a new recording.

use std::collections::HashMap;

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use lull_domain::confidence::ConfidenceTier;

use crate::{
	Error, LullService, Result,
	prompt::{self, HistoricalContext},
	stores::{IndexEntry, ItemLabelState, Neighbor},
};

#[derive(Debug, Clone)]
pub struct PredictRequest {
	pub item_id: Uuid,
	pub owner_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictStatus {
	Success,
	NeedsManualLabeling,
	NoSimilarItems,
	NoHistoricalData,
	PredictionFailed,
	Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionState {
	Created,
	EmbeddingStored,
	InsufficientLabels,
	Querying,
	NoSimilar,
	NoHistoricalData,
	Generating,
	PredictionReady,
	PredictionFailed,
	Error,
}
impl PredictionState {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Created => "created",
			Self::EmbeddingStored => "embedding_stored",
			Self::InsufficientLabels => "insufficient_labels",
			Self::Querying => "querying",
			Self::NoSimilar => "no_similar",
			Self::NoHistoricalData => "no_historical_data",
			Self::Generating => "generating",
			Self::PredictionReady => "prediction_ready",
			Self::PredictionFailed => "prediction_failed",
			Self::Error => "error",
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Prediction {
	pub label: String,
	pub resolution: String,
	pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NeighborUsed {
	pub item_id: Uuid,
	pub label: String,
	pub similarity: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PredictError {
	pub code: &'static str,
	pub message: String,
	pub retryable: bool,
}
impl PredictError {
	fn from_error(err: &Error) -> Self {
		Self { code: err.code(), message: err.to_string(), retryable: err.is_retryable() }
	}
}

#[derive(Debug, Clone, Serialize)]
pub struct PredictResponse {
	pub item_id: Uuid,
	pub owner_id: String,
	pub status: PredictStatus,
	pub state: PredictionState,
	pub validated_count: Option<u64>,
	pub confidence: Option<ConfidenceTier>,
	pub prediction: Option<Prediction>,
	pub neighbors: Vec<NeighborUsed>,
	pub message: Option<String>,
	pub error: Option<PredictError>,
	pub recompute_scheduled: bool,
}
impl PredictResponse {
	fn new(req: &PredictRequest, status: PredictStatus, state: PredictionState) -> Self {
		Self {
			item_id: req.item_id,
			owner_id: req.owner_id.clone(),
			status,
			state,
			validated_count: None,
			confidence: None,
			prediction: None,
			neighbors: Vec::new(),
			message: None,
			error: None,
			recompute_scheduled: false,
		}
	}
}

struct StateTrace {
	item_id: Uuid,
	state: PredictionState,
	recompute_scheduled: bool,
}
impl StateTrace {
	fn new(item_id: Uuid) -> Self {
		tracing::debug!(
			item_id = %item_id,
			state = PredictionState::Created.as_str(),
			"Prediction state."
		);

		Self { item_id, state: PredictionState::Created, recompute_scheduled: false }
	}

	fn advance(&mut self, next: PredictionState) -> PredictionState {
		tracing::debug!(
			item_id = %self.item_id,
			from = self.state.as_str(),
			to = next.as_str(),
			"Prediction state."
		);

		self.state = next;

		next
	}
}

impl LullService {
	/// Runs the prediction pipeline for one item. Every outcome, including failures, is reported
	/// through the response status.
	pub async fn predict(&self, req: PredictRequest) -> PredictResponse {
		let mut trace = StateTrace::new(req.item_id);
		let mut response = match self.run_predict(&req, &mut trace).await {
			Ok(response) => response,
			Err(err) => {
				tracing::error!(
					item_id = %req.item_id,
					owner_id = %req.owner_id,
					error = %err,
					"Prediction aborted."
				);

				let state = trace.advance(PredictionState::Error);
				let mut response = PredictResponse::new(&req, PredictStatus::Error, state);

				response.message = Some(err.to_string());
				response.error = Some(PredictError::from_error(&err));

				response
			},
		};

		response.recompute_scheduled = trace.recompute_scheduled;

		response
	}

	async fn run_predict(
		&self,
		req: &PredictRequest,
		trace: &mut StateTrace,
	) -> Result<PredictResponse> {
		let owner_id = req.owner_id.as_str();
		let item = self
			.stores
			.labels
			.get_item(req.item_id)
			.await?
			.filter(|item| item.owner_id == owner_id)
			.ok_or_else(|| Error::NotFound {
				message: format!("item {} for owner {owner_id}", req.item_id),
			})?;
		let raw =
			self.providers.features.extract(&self.cfg.providers.features, &item.audio_ref).await?;
		let guard = self.locks().lock(owner_id).await;

		self.store_raw(item.item_id, owner_id, &raw).await?;
		trace.advance(PredictionState::EmbeddingStored);

		// Decided under the guard so a concurrent predict cannot step the count past a multiple.
		trace.recompute_scheduled = match self.evaluate_recompute_trigger(owner_id).await {
			Ok(scheduled) => scheduled,
			Err(err) => {
				tracing::warn!(owner_id, error = %err, "Recompute trigger check failed.");

				false
			},
		};

		// Labels may have changed while the features were being extracted.
		let label_present = self
			.stores
			.labels
			.get_item(item.item_id)
			.await?
			.is_some_and(|current| current.label_present());
		let statistics = self.get_or_init_statistics(owner_id).await?;
		let standardized = self.standardize_with(&raw, &statistics)?;
		let entry = IndexEntry {
			item_id: item.item_id,
			owner_id: owner_id.to_string(),
			vector: standardized.clone(),
			label_present,
			timestamp: item.recorded_at,
		};

		if let Err(err) = self.stores.index.upsert(&entry).await {
			tracing::warn!(item_id = %item.item_id, error = %err, "Index upsert failed.");
		}

		let validated_count = self.stores.labels.count_labeled(owner_id).await?;
		let cfg = &self.cfg.prediction;
		let confidence = ConfidenceTier::from_validated_count(
			validated_count,
			cfg.min_labels,
			cfg.normal_confidence_labels,
		);

		if validated_count < u64::from(cfg.min_labels) {
			let state = trace.advance(PredictionState::InsufficientLabels);
			let mut response = PredictResponse::new(req, PredictStatus::NeedsManualLabeling, state);

			response.validated_count = Some(validated_count);
			response.confidence = Some(confidence);

			return Ok(response);
		}

		trace.advance(PredictionState::Querying);

		let top_k = cfg.top_k as usize;
		let mut hits =
			match self.stores.index.query_knn(owner_id, &standardized, top_k + 1, true).await {
				Ok(hits) => hits,
				Err(err) => {
					tracing::warn!(item_id = %item.item_id, error = %err, "Similarity query failed.");

					let state = trace.advance(PredictionState::NoSimilar);
					let mut response =
						PredictResponse::new(req, PredictStatus::NoSimilarItems, state);

					response.validated_count = Some(validated_count);
					response.message = Some(err.to_string());
					response.error = Some(PredictError::from_error(&err));

					return Ok(response);
				},
			};

		hits.retain(|hit| hit.item_id != item.item_id);
		hits.truncate(top_k);

		if hits.is_empty() {
			let state = trace.advance(PredictionState::NoSimilar);
			let mut response = PredictResponse::new(req, PredictStatus::NoSimilarItems, state);

			response.validated_count = Some(validated_count);

			return Ok(response);
		}

		let (history, neighbors) = self.resolve_history(owner_id, &hits).await?;

		if history.is_empty() {
			let state = trace.advance(PredictionState::NoHistoricalData);
			let mut response = PredictResponse::new(req, PredictStatus::NoHistoricalData, state);

			response.validated_count = Some(validated_count);

			return Ok(response);
		}

		drop(guard);
		trace.advance(PredictionState::Generating);

		let messages = prompt::build_messages(&history, item.image_url.as_deref());
		let generated = match self
			.providers
			.generation
			.generate(&self.cfg.providers.generation, &messages)
			.await
		{
			Ok(reply) => prompt::parse_generated_label(&reply).ok_or_else(|| {
				"Generation reply is missing a label or resolution.".to_string()
			}),
			Err(err) => Err(err.to_string()),
		};
		let generated = match generated {
			Ok(generated) => generated,
			Err(message) => {
				tracing::warn!(item_id = %item.item_id, error = %message, "Generation failed.");

				let state = trace.advance(PredictionState::PredictionFailed);
				let mut response = PredictResponse::new(req, PredictStatus::PredictionFailed, state);

				response.validated_count = Some(validated_count);
				response.neighbors = neighbors;
				response.message = Some(message);

				return Ok(response);
			},
		};

		self.stores
			.labels
			.save_prediction(item.item_id, &generated, OffsetDateTime::now_utc())
			.await?;

		let state = trace.advance(PredictionState::PredictionReady);
		let mut response = PredictResponse::new(req, PredictStatus::Success, state);

		tracing::info!(
			item_id = %item.item_id,
			owner_id,
			label = %generated.label,
			neighbors = neighbors.len(),
			confidence = confidence.as_str(),
			"Prediction ready."
		);

		response.validated_count = Some(validated_count);
		response.confidence = Some(confidence);
		response.neighbors = neighbors;
		response.prediction = Some(Prediction {
			label: generated.label,
			resolution: generated.resolution,
			notes: generated.notes,
		});

		Ok(response)
	}

	/// Pairs each hit with its owner's validated label, keeping hit order and dropping hits whose
	/// label state is missing or no longer validated.
	async fn resolve_history(
		&self,
		owner_id: &str,
		hits: &[Neighbor],
	) -> Result<(Vec<HistoricalContext>, Vec<NeighborUsed>)> {
		let ids: Vec<Uuid> = hits.iter().map(|hit| hit.item_id).collect();
		let items: HashMap<Uuid, ItemLabelState> = self
			.stores
			.labels
			.get_items(&ids)
			.await?
			.into_iter()
			.map(|item| (item.item_id, item))
			.collect();
		let mut history = Vec::with_capacity(hits.len());
		let mut neighbors = Vec::with_capacity(hits.len());

		for hit in hits {
			let Some(item) = items.get(&hit.item_id) else {
				tracing::debug!(item_id = %hit.item_id, "Neighbor has no label state.");

				continue;
			};

			if item.owner_id != owner_id || !item.label_present() {
				continue;
			}

			let Some(label) = item.label.clone() else {
				continue;
			};

			history.push(HistoricalContext {
				label: label.clone(),
				resolution: item.resolution.clone(),
				notes: item.notes.clone(),
				similarity: hit.similarity,
			});
			neighbors.push(NeighborUsed { item_id: hit.item_id, label, similarity: hit.similarity });
		}

		Ok((history, neighbors))
	}
}
