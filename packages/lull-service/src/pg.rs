//! Postgres-backed stores and the durable recompute scheduler.

use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use lull_storage::{
	items,
	jobs,
	models::{ItemRow, RawEmbeddingRow, UserStatisticsRow},
	queries,
	vector::format_vector_text,
};

use crate::{
	BoxFuture, Error, Result,
	stores::{
		GeneratedLabel, ItemLabelState, LabelStore, LabelUpdate, RawEmbeddingRecord,
		RawVectorStore, RecomputeScheduler, StatisticsStore, UserStatistics,
	},
};

#[derive(Clone)]
pub struct PgStore {
	pool: PgPool,
}
impl PgStore {
	pub fn new(pool: PgPool) -> Self {
		Self { pool }
	}
}

impl RawVectorStore for PgStore {
	fn upsert_raw<'a>(
		&'a self,
		item_id: Uuid,
		owner_id: &'a str,
		vector: &'a [f32],
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let vec_text = format_vector_text(vector);

			queries::upsert_raw_embedding(&self.pool, item_id, owner_id, &vec_text, now).await?;

			Ok(())
		})
	}

	fn get_raw_batch<'a>(
		&'a self,
		item_ids: &'a [Uuid],
	) -> BoxFuture<'a, Result<Vec<RawEmbeddingRecord>>> {
		Box::pin(async move {
			let rows = queries::get_raw_embeddings(&self.pool, item_ids).await?;

			rows.into_iter().map(raw_record).collect()
		})
	}

	fn list_for_owner<'a>(
		&'a self,
		owner_id: &'a str,
	) -> BoxFuture<'a, Result<Vec<RawEmbeddingRecord>>> {
		Box::pin(async move {
			let rows = queries::list_raw_embeddings_for_owner(&self.pool, owner_id).await?;

			rows.into_iter().map(raw_record).collect()
		})
	}

	fn count_for_owner<'a>(&'a self, owner_id: &'a str) -> BoxFuture<'a, Result<u64>> {
		Box::pin(async move {
			let count = queries::count_raw_embeddings_for_owner(&self.pool, owner_id).await?;

			Ok(u64::try_from(count).unwrap_or(0))
		})
	}
}

impl StatisticsStore for PgStore {
	fn get_statistics<'a>(
		&'a self,
		owner_id: &'a str,
	) -> BoxFuture<'a, Result<Option<UserStatistics>>> {
		Box::pin(async move {
			queries::get_user_statistics(&self.pool, owner_id).await?.map(statistics).transpose()
		})
	}

	fn insert_identity<'a>(
		&'a self,
		owner_id: &'a str,
		dim: usize,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let mean = format_vector_text(&vec![0.0; dim]);
			let std = format_vector_text(&vec![1.0; dim]);

			queries::insert_identity_statistics(&self.pool, owner_id, &mean, &std, now).await?;

			Ok(())
		})
	}

	fn replace_statistics<'a>(
		&'a self,
		owner_id: &'a str,
		mean: &'a [f32],
		std: &'a [f32],
		sample_count: u64,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<UserStatistics>> {
		Box::pin(async move {
			let sample_count = i64::try_from(sample_count)
				.map_err(|_| Error::validation("Sample count does not fit in a bigint."))?;
			let row = queries::update_user_statistics(
				&self.pool,
				owner_id,
				&format_vector_text(mean),
				&format_vector_text(std),
				sample_count,
				now,
			)
			.await?;

			statistics(row)
		})
	}
}

impl LabelStore for PgStore {
	fn get_item<'a>(&'a self, item_id: Uuid) -> BoxFuture<'a, Result<Option<ItemLabelState>>> {
		Box::pin(async move { Ok(items::get_item(&self.pool, item_id).await?.map(item_state)) })
	}

	fn get_items<'a>(
		&'a self,
		item_ids: &'a [Uuid],
	) -> BoxFuture<'a, Result<Vec<ItemLabelState>>> {
		Box::pin(async move {
			let rows = items::get_items(&self.pool, item_ids).await?;

			Ok(rows.into_iter().map(item_state).collect())
		})
	}

	fn count_labeled<'a>(&'a self, owner_id: &'a str) -> BoxFuture<'a, Result<u64>> {
		Box::pin(async move {
			let count = items::count_labeled_items(&self.pool, owner_id).await?;

			Ok(u64::try_from(count).unwrap_or(0))
		})
	}

	fn save_prediction<'a>(
		&'a self,
		item_id: Uuid,
		prediction: &'a GeneratedLabel,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let updated = items::save_ai_prediction(
				&self.pool,
				item_id,
				&prediction.label,
				&prediction.resolution,
				prediction.notes.as_deref(),
				now,
			)
			.await?;

			if !updated {
				return Err(Error::NotFound { message: format!("item {item_id}") });
			}

			Ok(())
		})
	}

	fn update_labels<'a>(
		&'a self,
		item_id: Uuid,
		owner_id: &'a str,
		update: &'a LabelUpdate,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<Option<ItemLabelState>>> {
		Box::pin(async move {
			let update = items::LabelUpdate {
				label: update.label.as_deref(),
				resolution: update.resolution.as_deref(),
				notes: update.notes.as_deref(),
				validated: update.validated,
			};
			let row = items::update_item_labels(&self.pool, item_id, owner_id, &update, now).await?;

			Ok(row.map(item_state))
		})
	}
}

/// Queues recomputes in `prediction_jobs` for the worker to pick up.
#[derive(Clone)]
pub struct PgRecomputeScheduler {
	pool: PgPool,
}
impl PgRecomputeScheduler {
	pub fn new(pool: PgPool) -> Self {
		Self { pool }
	}
}

impl RecomputeScheduler for PgRecomputeScheduler {
	fn schedule<'a>(&'a self, owner_id: &'a str) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let queued =
				jobs::enqueue_recompute_job(&self.pool, owner_id, OffsetDateTime::now_utc()).await?;

			if !queued {
				tracing::debug!(owner_id, "Recompute already pending.");
			}

			Ok(())
		})
	}
}

fn raw_record(row: RawEmbeddingRow) -> Result<RawEmbeddingRecord> {
	let vector = row.vector()?;

	Ok(RawEmbeddingRecord {
		item_id: row.item_id,
		owner_id: row.owner_id,
		vector,
		created_at: row.created_at,
		updated_at: row.updated_at,
	})
}

fn statistics(row: UserStatisticsRow) -> Result<UserStatistics> {
	let mean = row.mean()?;
	let std = row.std()?;

	Ok(UserStatistics {
		owner_id: row.owner_id,
		mean,
		std,
		sample_count: u64::try_from(row.sample_count).unwrap_or(0),
		generation: row.generation,
		updated_at: row.updated_at,
	})
}

fn item_state(row: ItemRow) -> ItemLabelState {
	ItemLabelState {
		item_id: row.item_id,
		owner_id: row.owner_id,
		label: row.label,
		label_source: row.label_source,
		resolution: row.resolution,
		resolution_source: row.resolution_source,
		notes: row.notes,
		validated: row.validated,
		audio_ref: row.audio_ref,
		image_url: row.image_url,
		recorded_at: row.recorded_at,
	}
}
