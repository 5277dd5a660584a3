//! Records the pipeline moves between stores, and the seams each store sits behind.

use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{BoxFuture, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct RawEmbeddingRecord {
	pub item_id: Uuid,
	pub owner_id: String,
	pub vector: Vec<f32>,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserStatistics {
	pub owner_id: String,
	pub mean: Vec<f32>,
	pub std: Vec<f32>,
	pub sample_count: u64,
	/// Incremented by every persisted recompute.
	pub generation: i64,
	pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemLabelState {
	pub item_id: Uuid,
	pub owner_id: String,
	pub label: Option<String>,
	pub label_source: Option<String>,
	pub resolution: Option<String>,
	pub resolution_source: Option<String>,
	pub notes: Option<String>,
	pub validated: Option<bool>,
	pub audio_ref: String,
	pub image_url: Option<String>,
	#[serde(with = "crate::time_serde")]
	pub recorded_at: OffsetDateTime,
}
impl ItemLabelState {
	/// A label counts only once a user has validated it and it is not blank.
	pub fn label_present(&self) -> bool {
		self.validated == Some(true)
			&& self.label.as_deref().is_some_and(|label| !label.trim().is_empty())
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelUpdate {
	pub label: Option<String>,
	pub resolution: Option<String>,
	pub notes: Option<String>,
	pub validated: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedLabel {
	pub label: String,
	pub resolution: String,
	pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
	pub item_id: Uuid,
	pub owner_id: String,
	pub vector: Vec<f32>,
	pub label_present: bool,
	pub timestamp: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
	pub item_id: Uuid,
	/// Cosine similarity in [-1, 1].
	pub similarity: f32,
}

pub trait RawVectorStore
where
	Self: Send + Sync,
{
	fn upsert_raw<'a>(
		&'a self,
		item_id: Uuid,
		owner_id: &'a str,
		vector: &'a [f32],
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<()>>;

	/// Missing ids are omitted from the result.
	fn get_raw_batch<'a>(
		&'a self,
		item_ids: &'a [Uuid],
	) -> BoxFuture<'a, Result<Vec<RawEmbeddingRecord>>>;

	/// Ordered by item id.
	fn list_for_owner<'a>(
		&'a self,
		owner_id: &'a str,
	) -> BoxFuture<'a, Result<Vec<RawEmbeddingRecord>>>;

	fn count_for_owner<'a>(&'a self, owner_id: &'a str) -> BoxFuture<'a, Result<u64>>;
}

pub trait StatisticsStore
where
	Self: Send + Sync,
{
	fn get_statistics<'a>(
		&'a self,
		owner_id: &'a str,
	) -> BoxFuture<'a, Result<Option<UserStatistics>>>;

	/// Inserts identity statistics unless a row already exists.
	fn insert_identity<'a>(
		&'a self,
		owner_id: &'a str,
		dim: usize,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<()>>;

	/// Replaces existing statistics and bumps the generation. Fails with
	/// [`crate::Error::NotFound`] when the owner has no row.
	fn replace_statistics<'a>(
		&'a self,
		owner_id: &'a str,
		mean: &'a [f32],
		std: &'a [f32],
		sample_count: u64,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<UserStatistics>>;
}

pub trait LabelStore
where
	Self: Send + Sync,
{
	fn get_item<'a>(&'a self, item_id: Uuid) -> BoxFuture<'a, Result<Option<ItemLabelState>>>;

	fn get_items<'a>(&'a self, item_ids: &'a [Uuid])
	-> BoxFuture<'a, Result<Vec<ItemLabelState>>>;

	/// Number of the owner's items with a validated, non-blank label.
	fn count_labeled<'a>(&'a self, owner_id: &'a str) -> BoxFuture<'a, Result<u64>>;

	fn save_prediction<'a>(
		&'a self,
		item_id: Uuid,
		prediction: &'a GeneratedLabel,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<()>>;

	fn update_labels<'a>(
		&'a self,
		item_id: Uuid,
		owner_id: &'a str,
		update: &'a LabelUpdate,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<Option<ItemLabelState>>>;
}

pub trait SimilarityIndex
where
	Self: Send + Sync,
{
	fn upsert<'a>(&'a self, entry: &'a IndexEntry) -> BoxFuture<'a, Result<()>>;

	/// Deleting an absent entry succeeds.
	fn delete<'a>(&'a self, item_id: Uuid) -> BoxFuture<'a, Result<()>>;

	/// Returns at most `k` of the owner's entries by descending similarity, ties by ascending
	/// item id.
	fn query_knn<'a>(
		&'a self,
		owner_id: &'a str,
		vector: &'a [f32],
		k: usize,
		require_label: bool,
	) -> BoxFuture<'a, Result<Vec<Neighbor>>>;

	/// No-op when the entry is absent.
	fn set_label_present<'a>(
		&'a self,
		item_id: Uuid,
		label_present: bool,
	) -> BoxFuture<'a, Result<()>>;
}

/// Hands an owner to whatever runs the recompute job. Implementations must not wait for it.
pub trait RecomputeScheduler
where
	Self: Send + Sync,
{
	fn schedule<'a>(&'a self, owner_id: &'a str) -> BoxFuture<'a, Result<()>>;
}

#[derive(Clone)]
pub struct Stores {
	pub raw: Arc<dyn RawVectorStore>,
	pub statistics: Arc<dyn StatisticsStore>,
	pub labels: Arc<dyn LabelStore>,
	pub index: Arc<dyn SimilarityIndex>,
	pub scheduler: Arc<dyn RecomputeScheduler>,
}
