//! Qdrant-backed similarity index.

use std::collections::HashMap;

use qdrant_client::{
	Payload,
	qdrant::{
		Condition, DeletePointsBuilder, Filter, PointId, PointStruct, PointsIdsList, Query,
		QueryPointsBuilder, SetPayloadPointsBuilder, UpsertPointsBuilder, Value,
		point_id::PointIdOptions, value::Kind,
	},
};
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

use lull_storage::qdrant::{LABEL_PRESENT_KEY, OWNER_ID_KEY, QdrantStore, TIMESTAMP_KEY};

use crate::{
	BoxFuture, Error, Result,
	stores::{IndexEntry, Neighbor, SimilarityIndex},
};

/// Extra hits requested past `k` so equal scores at the cut can still be ordered by item id.
const TIE_SLACK: usize = 8;
const MAX_QUERY_LIMIT: usize = 1_024;

pub struct QdrantIndex {
	qdrant: QdrantStore,
}
impl QdrantIndex {
	pub fn new(qdrant: QdrantStore) -> Self {
		Self { qdrant }
	}

	fn point_ids(item_id: Uuid) -> PointsIdsList {
		PointsIdsList { ids: vec![PointId::from(item_id.to_string())] }
	}
}

impl SimilarityIndex for QdrantIndex {
	fn upsert<'a>(&'a self, entry: &'a IndexEntry) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let timestamp = entry.timestamp.format(&Rfc3339).map_err(Error::index)?;
			let mut payload = Payload::new();

			payload.insert(OWNER_ID_KEY, entry.owner_id.clone());
			payload.insert(LABEL_PRESENT_KEY, entry.label_present);
			payload.insert(TIMESTAMP_KEY, timestamp);

			let point = PointStruct::new(entry.item_id.to_string(), entry.vector.clone(), payload);

			self.qdrant
				.client
				.upsert_points(
					UpsertPointsBuilder::new(self.qdrant.collection.clone(), vec![point]).wait(true),
				)
				.await
				.map_err(Error::index)?;

			Ok(())
		})
	}

	fn delete<'a>(&'a self, item_id: Uuid) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let delete = DeletePointsBuilder::new(self.qdrant.collection.clone())
				.points(Self::point_ids(item_id))
				.wait(true);

			match self.qdrant.client.delete_points(delete).await {
				Ok(_) => Ok(()),
				Err(err) if is_not_found_error(&err) => {
					tracing::debug!(item_id = %item_id, "Qdrant point already absent.");

					Ok(())
				},
				Err(err) => Err(Error::index(err)),
			}
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
			if k == 0 {
				return Ok(Vec::new());
			}

			let mut conditions = vec![Condition::matches(OWNER_ID_KEY, owner_id.to_string())];

			if require_label {
				conditions.push(Condition::matches(LABEL_PRESENT_KEY, true));
			}

			let zero_query = vector.iter().all(|value| *value == 0.0);
			let mut limit = k.saturating_add(TIE_SLACK);

			loop {
				let search = QueryPointsBuilder::new(self.qdrant.collection.clone())
					.query(Query::new_nearest(vector.to_vec()))
					.filter(Filter::must(conditions.clone()))
					.limit(limit as u64)
					.with_payload(true);
				let response = self.qdrant.client.query(search).await.map_err(Error::index)?;
				let returned = response.result.len();
				let mut neighbors: Vec<Neighbor> = response
					.result
					.into_iter()
					.filter(|point| payload_str(&point.payload, OWNER_ID_KEY) == Some(owner_id))
					.filter_map(|point| {
						let item_id = point.id.as_ref().and_then(point_id_to_uuid)?;
						let similarity = if zero_query { 0.0 } else { point.score };

						Some(Neighbor { item_id, similarity })
					})
					.collect();

				if limit < MAX_QUERY_LIMIT && page_may_split_ties(&neighbors, returned, k, limit) {
					limit = limit.saturating_mul(2).min(MAX_QUERY_LIMIT);

					continue;
				}

				crate::memory::sort_neighbors(&mut neighbors);
				neighbors.truncate(k);

				return Ok(neighbors);
			}
		})
	}

	fn set_label_present<'a>(
		&'a self,
		item_id: Uuid,
		label_present: bool,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let mut payload = Payload::new();

			payload.insert(LABEL_PRESENT_KEY, label_present);

			let update = SetPayloadPointsBuilder::new(self.qdrant.collection.clone(), payload)
				.points_selector(Self::point_ids(item_id))
				.wait(true);

			match self.qdrant.client.set_payload(update).await {
				Ok(_) => Ok(()),
				Err(err) if is_not_found_error(&err) => Ok(()),
				Err(err) => Err(Error::index(err)),
			}
		})
	}
}

/// A full page whose last score equals the k-th score may have cut off entries that tie with it.
fn page_may_split_ties(page: &[Neighbor], returned: usize, k: usize, limit: usize) -> bool {
	if returned < limit || page.len() < k || k == 0 {
		return false;
	}

	match (page.get(k - 1), page.last()) {
		(Some(kth), Some(last)) => kth.similarity == last.similarity,
		_ => false,
	}
}

fn is_not_found_error(err: &qdrant_client::QdrantError) -> bool {
	let message = err.to_string().to_lowercase();
	let point_not_found =
		(message.contains("not found") || message.contains("404")) && message.contains("point");
	let no_point_found = message.contains("no point") && message.contains("found");

	point_not_found || no_point_found
}

fn point_id_to_uuid(point_id: &PointId) -> Option<Uuid> {
	match &point_id.point_id_options {
		Some(PointIdOptions::Uuid(id)) => Uuid::parse_str(id).ok(),
		_ => None,
	}
}

fn payload_str<'a>(payload: &'a HashMap<String, Value>, key: &str) -> Option<&'a str> {
	match &payload.get(key)?.kind {
		Some(Kind::StringValue(text)) => Some(text.as_str()),
		_ => None,
	}
}
