//! Full per-owner statistics recompute and index re-synchronization.

use std::collections::HashMap;

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use lull_domain::trigger::RecomputeTrigger;

use crate::{
	Error, LullService, Result,
	stores::{IndexEntry, ItemLabelState, RawEmbeddingRecord, UserStatistics},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecomputeReport {
	pub owner_id: String,
	pub sample_count: u64,
	pub generation: i64,
	pub resynced_count: u64,
	pub missing_item_count: u64,
	pub error_count: u64,
}

enum ResyncOutcome {
	Resynced,
	MissingItem,
	Failed,
}

impl LullService {
	/// Hands the owner to the scheduler when the raw vector count reaches an unprocessed multiple
	/// of the recompute interval. Returns whether a recompute was scheduled.
	pub async fn evaluate_recompute_trigger(&self, owner_id: &str) -> Result<bool> {
		let count = self.stores.raw.count_for_owner(owner_id).await?;
		let last_sample_count = self
			.stores
			.statistics
			.get_statistics(owner_id)
			.await?
			.map_or(0, |statistics| statistics.sample_count);
		let trigger = RecomputeTrigger::new(self.cfg.standardization.recompute_interval);

		if !trigger.fires(count, last_sample_count) {
			return Ok(false);
		}

		self.stores.scheduler.schedule(owner_id).await?;

		tracing::info!(owner_id, count, last_sample_count, "Recompute scheduled.");

		Ok(true)
	}

	/// Recomputes an owner's statistics from every raw vector and rewrites each index entry with
	/// them.
	///
	/// Persisting the statistics is fatal. After that, a removed owner or a newer generation
	/// aborts the remaining work, while a failure on a single item is logged and counted.
	pub async fn recompute_owner(&self, owner_id: &str) -> Result<RecomputeReport> {
		let _guard = self.locks().lock(owner_id).await;
		let records = self.stores.raw.list_for_owner(owner_id).await?;
		let vectors: Vec<&[f32]> = records.iter().map(|record| record.vector.as_slice()).collect();
		let computed = self.compute_statistics(&vectors)?;
		let persisted = match self
			.stores
			.statistics
			.replace_statistics(
				owner_id,
				&computed.mean,
				&computed.std,
				computed.sample_count as u64,
				OffsetDateTime::now_utc(),
			)
			.await
		{
			Ok(persisted) => persisted,
			Err(Error::NotFound { .. }) =>
				return Err(Error::OwnerRemoved { owner_id: owner_id.to_string() }),
			Err(err) => return Err(err),
		};

		tracing::info!(
			owner_id,
			sample_count = persisted.sample_count,
			generation = persisted.generation,
			"Statistics recomputed."
		);

		let ids: Vec<Uuid> = records.iter().map(|record| record.item_id).collect();
		let items: HashMap<Uuid, ItemLabelState> = self
			.stores
			.labels
			.get_items(&ids)
			.await?
			.into_iter()
			.map(|item| (item.item_id, item))
			.collect();
		let mut report = RecomputeReport {
			owner_id: owner_id.to_string(),
			sample_count: persisted.sample_count,
			generation: persisted.generation,
			resynced_count: 0,
			missing_item_count: 0,
			error_count: 0,
		};

		for record in &records {
			self.ensure_generation(owner_id, persisted.generation).await?;

			match self.resync_item(record, items.get(&record.item_id), &persisted).await {
				ResyncOutcome::Resynced => report.resynced_count += 1,
				ResyncOutcome::MissingItem => report.missing_item_count += 1,
				ResyncOutcome::Failed => report.error_count += 1,
			}
		}

		tracing::info!(
			owner_id,
			resynced = report.resynced_count,
			missing = report.missing_item_count,
			errors = report.error_count,
			"Index re-synchronized."
		);

		Ok(report)
	}

	async fn ensure_generation(&self, owner_id: &str, generation: i64) -> Result<()> {
		match self.stores.statistics.get_statistics(owner_id).await? {
			None => Err(Error::OwnerRemoved { owner_id: owner_id.to_string() }),
			Some(current) if current.generation != generation => Err(Error::Superseded {
				owner_id: owner_id.to_string(),
				expected: generation,
				found: current.generation,
			}),
			Some(_) => Ok(()),
		}
	}

	async fn resync_item(
		&self,
		record: &RawEmbeddingRecord,
		item: Option<&ItemLabelState>,
		statistics: &UserStatistics,
	) -> ResyncOutcome {
		let Some(item) = item.filter(|item| item.owner_id == record.owner_id) else {
			tracing::warn!(item_id = %record.item_id, "Raw vector has no matching item.");

			return ResyncOutcome::MissingItem;
		};
		let vector = match self.standardize_with(&record.vector, statistics) {
			Ok(vector) => vector,
			Err(err) => {
				tracing::error!(item_id = %record.item_id, error = %err, "Standardization failed.");

				return ResyncOutcome::Failed;
			},
		};

		if let Err(err) = self.stores.index.delete(record.item_id).await {
			tracing::warn!(item_id = %record.item_id, error = %err, "Index delete failed.");
		}

		let entry = IndexEntry {
			item_id: record.item_id,
			owner_id: record.owner_id.clone(),
			vector,
			label_present: item.label_present(),
			timestamp: item.recorded_at,
		};

		match self.stores.index.upsert(&entry).await {
			Ok(()) => ResyncOutcome::Resynced,
			Err(err) => {
				tracing::error!(item_id = %record.item_id, error = %err, "Index upsert failed.");

				ResyncOutcome::Failed
			},
		}
	}
}
