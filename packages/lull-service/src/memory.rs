//! In-process stores and index for local runs and deterministic tests.

use std::{
	cmp::Ordering,
	collections::{BTreeMap, HashMap},
	sync::{Mutex, MutexGuard},
};

use time::OffsetDateTime;
use uuid::Uuid;

use lull_storage::items::{SOURCE_AI, SOURCE_USER};

use crate::{
	BoxFuture, Error, Result,
	stores::{
		GeneratedLabel, IndexEntry, ItemLabelState, LabelStore, LabelUpdate, Neighbor,
		RawEmbeddingRecord, RawVectorStore, RecomputeScheduler, SimilarityIndex, StatisticsStore,
		UserStatistics,
	},
};

#[derive(Default)]
struct MemoryState {
	raw: BTreeMap<Uuid, RawEmbeddingRecord>,
	statistics: HashMap<String, UserStatistics>,
	items: HashMap<Uuid, ItemLabelState>,
}

/// Raw vectors, statistics, and item labels held behind one lock.
#[derive(Default)]
pub struct MemoryStore {
	state: Mutex<MemoryState>,
}
impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn insert_item(&self, item: ItemLabelState) {
		self.lock().items.insert(item.item_id, item);
	}

	/// Drops an owner's statistics row, as deleting the owner would.
	pub fn remove_statistics(&self, owner_id: &str) -> bool {
		self.lock().statistics.remove(owner_id).is_some()
	}

	fn lock(&self) -> MutexGuard<'_, MemoryState> {
		self.state.lock().unwrap_or_else(|err| err.into_inner())
	}
}

impl RawVectorStore for MemoryStore {
	fn upsert_raw<'a>(
		&'a self,
		item_id: Uuid,
		owner_id: &'a str,
		vector: &'a [f32],
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let mut state = self.lock();
			let created_at = state.raw.get(&item_id).map_or(now, |record| record.created_at);

			state.raw.insert(
				item_id,
				RawEmbeddingRecord {
					item_id,
					owner_id: owner_id.to_string(),
					vector: vector.to_vec(),
					created_at,
					updated_at: now,
				},
			);

			Ok(())
		})
	}

	fn get_raw_batch<'a>(
		&'a self,
		item_ids: &'a [Uuid],
	) -> BoxFuture<'a, Result<Vec<RawEmbeddingRecord>>> {
		Box::pin(async move {
			let state = self.lock();

			Ok(item_ids.iter().filter_map(|item_id| state.raw.get(item_id).cloned()).collect())
		})
	}

	fn list_for_owner<'a>(
		&'a self,
		owner_id: &'a str,
	) -> BoxFuture<'a, Result<Vec<RawEmbeddingRecord>>> {
		Box::pin(async move {
			let state = self.lock();

			Ok(state.raw.values().filter(|record| record.owner_id == owner_id).cloned().collect())
		})
	}

	fn count_for_owner<'a>(&'a self, owner_id: &'a str) -> BoxFuture<'a, Result<u64>> {
		Box::pin(async move {
			let state = self.lock();

			Ok(state.raw.values().filter(|record| record.owner_id == owner_id).count() as u64)
		})
	}
}

impl StatisticsStore for MemoryStore {
	fn get_statistics<'a>(
		&'a self,
		owner_id: &'a str,
	) -> BoxFuture<'a, Result<Option<UserStatistics>>> {
		Box::pin(async move { Ok(self.lock().statistics.get(owner_id).cloned()) })
	}

	fn insert_identity<'a>(
		&'a self,
		owner_id: &'a str,
		dim: usize,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			self.lock().statistics.entry(owner_id.to_string()).or_insert_with(|| UserStatistics {
				owner_id: owner_id.to_string(),
				mean: vec![0.0; dim],
				std: vec![1.0; dim],
				sample_count: 0,
				generation: 0,
				updated_at: now,
			});

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
			let mut state = self.lock();
			let Some(current) = state.statistics.get_mut(owner_id) else {
				return Err(Error::NotFound { message: format!("statistics for owner {owner_id}") });
			};

			current.mean = mean.to_vec();
			current.std = std.to_vec();
			current.sample_count = sample_count;
			current.generation += 1;
			current.updated_at = now;

			Ok(current.clone())
		})
	}
}

impl LabelStore for MemoryStore {
	fn get_item<'a>(&'a self, item_id: Uuid) -> BoxFuture<'a, Result<Option<ItemLabelState>>> {
		Box::pin(async move { Ok(self.lock().items.get(&item_id).cloned()) })
	}

	fn get_items<'a>(
		&'a self,
		item_ids: &'a [Uuid],
	) -> BoxFuture<'a, Result<Vec<ItemLabelState>>> {
		Box::pin(async move {
			let state = self.lock();

			Ok(item_ids.iter().filter_map(|item_id| state.items.get(item_id).cloned()).collect())
		})
	}

	fn count_labeled<'a>(&'a self, owner_id: &'a str) -> BoxFuture<'a, Result<u64>> {
		Box::pin(async move {
			let state = self.lock();

			Ok(state
				.items
				.values()
				.filter(|item| item.owner_id == owner_id && item.label_present())
				.count() as u64)
		})
	}

	fn save_prediction<'a>(
		&'a self,
		item_id: Uuid,
		prediction: &'a GeneratedLabel,
		_now: OffsetDateTime,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let mut state = self.lock();
			let Some(item) = state.items.get_mut(&item_id) else {
				return Err(Error::NotFound { message: format!("item {item_id}") });
			};

			item.label = Some(prediction.label.clone());
			item.label_source = Some(SOURCE_AI.to_string());
			item.resolution = Some(prediction.resolution.clone());
			item.resolution_source = Some(SOURCE_AI.to_string());
			item.notes = prediction.notes.clone();
			item.validated = None;

			Ok(())
		})
	}

	fn update_labels<'a>(
		&'a self,
		item_id: Uuid,
		owner_id: &'a str,
		update: &'a LabelUpdate,
		_now: OffsetDateTime,
	) -> BoxFuture<'a, Result<Option<ItemLabelState>>> {
		Box::pin(async move {
			let mut state = self.lock();
			let Some(item) =
				state.items.get_mut(&item_id).filter(|item| item.owner_id == owner_id)
			else {
				return Ok(None);
			};

			if let Some(label) = &update.label {
				item.label = Some(label.clone());
				item.label_source = Some(SOURCE_USER.to_string());
			}
			if let Some(resolution) = &update.resolution {
				item.resolution = Some(resolution.clone());
				item.resolution_source = Some(SOURCE_USER.to_string());
			}
			if let Some(notes) = &update.notes {
				item.notes = Some(notes.clone());
			}
			if let Some(validated) = update.validated {
				item.validated = Some(validated);
			}

			Ok(Some(item.clone()))
		})
	}
}

/// Exact KNN over every stored entry.
#[derive(Default)]
pub struct MemoryIndex {
	entries: Mutex<BTreeMap<Uuid, IndexEntry>>,
}
impl MemoryIndex {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn entry(&self, item_id: Uuid) -> Option<IndexEntry> {
		self.lock().get(&item_id).cloned()
	}

	pub fn len(&self) -> usize {
		self.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.lock().is_empty()
	}

	fn lock(&self) -> MutexGuard<'_, BTreeMap<Uuid, IndexEntry>> {
		self.entries.lock().unwrap_or_else(|err| err.into_inner())
	}
}

impl SimilarityIndex for MemoryIndex {
	fn upsert<'a>(&'a self, entry: &'a IndexEntry) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			self.lock().insert(entry.item_id, entry.clone());

			Ok(())
		})
	}

	fn delete<'a>(&'a self, item_id: Uuid) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			self.lock().remove(&item_id);

			Ok(())
		})
	}

	fn query_knn<'a>(
		&'a self,
		owner_id: &'a str,
		vector: &'a [f32],
		k: usize,
		require_label: bool,
	) -> BoxFuture<'a, Result<Vec<Neighbor>>> {
		Box::pin(async move {
			let entries = self.lock();
			let mut neighbors: Vec<Neighbor> = entries
				.values()
				.filter(|entry| entry.owner_id == owner_id)
				.filter(|entry| !require_label || entry.label_present)
				.map(|entry| Neighbor {
					item_id: entry.item_id,
					similarity: cosine_similarity(vector, &entry.vector),
				})
				.collect();

			sort_neighbors(&mut neighbors);
			neighbors.truncate(k);

			Ok(neighbors)
		})
	}

	fn set_label_present<'a>(
		&'a self,
		item_id: Uuid,
		label_present: bool,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			if let Some(entry) = self.lock().get_mut(&item_id) {
				entry.label_present = label_present;
			}

			Ok(())
		})
	}
}

/// Collects scheduled owners so a caller can run or inspect them later.
#[derive(Default)]
pub struct QueuedRecomputes {
	owners: Mutex<Vec<String>>,
}
impl QueuedRecomputes {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn drain(&self) -> Vec<String> {
		std::mem::take(&mut *self.owners.lock().unwrap_or_else(|err| err.into_inner()))
	}
}

impl RecomputeScheduler for QueuedRecomputes {
	fn schedule<'a>(&'a self, owner_id: &'a str) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			self.owners.lock().unwrap_or_else(|err| err.into_inner()).push(owner_id.to_string());

			Ok(())
		})
	}
}

/// Cosine similarity computed in f64. Zero-norm inputs have similarity 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
	let mut dot = 0.0_f64;
	let mut norm_a = 0.0_f64;
	let mut norm_b = 0.0_f64;

	for (x, y) in a.iter().zip(b) {
		let (x, y) = (f64::from(*x), f64::from(*y));

		dot += x * y;
		norm_a += x * x;
		norm_b += y * y;
	}

	if norm_a == 0.0 || norm_b == 0.0 {
		return 0.0;
	}

	(dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0) as f32
}

pub(crate) fn sort_neighbors(neighbors: &mut [Neighbor]) {
	neighbors.sort_by(|a, b| {
		b.similarity
			.partial_cmp(&a.similarity)
			.unwrap_or(Ordering::Equal)
			.then_with(|| a.item_id.cmp(&b.item_id))
	});
}
