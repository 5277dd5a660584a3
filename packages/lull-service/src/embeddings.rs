use time::OffsetDateTime;
use uuid::Uuid;

use lull_domain::standardize;

use crate::{
	Error, LullService, Result,
	stores::{RawEmbeddingRecord, UserStatistics},
};

impl LullService {
	/// Upserts the raw vector for an item after checking its dimension and that every element is
	/// finite.
	pub async fn store_raw(&self, item_id: Uuid, owner_id: &str, vector: &[f32]) -> Result<()> {
		self.validate_vector(vector)?;
		self.stores.raw.upsert_raw(item_id, owner_id, vector, OffsetDateTime::now_utc()).await
	}

	pub async fn get_raw_batch(&self, item_ids: &[Uuid]) -> Result<Vec<RawEmbeddingRecord>> {
		self.stores.raw.get_raw_batch(item_ids).await
	}

	pub(crate) fn validate_vector(&self, vector: &[f32]) -> Result<()> {
		let expected = self.vector_dim();

		if vector.len() != expected {
			return Err(Error::validation(format!(
				"Vector has {} dimensions, expected {expected}.",
				vector.len()
			)));
		}
		if let Some(position) = vector.iter().position(|value| !value.is_finite()) {
			return Err(Error::validation(format!("Vector element {position} is not finite.")));
		}

		Ok(())
	}

	pub(crate) fn standardize_with(
		&self,
		vector: &[f32],
		statistics: &UserStatistics,
	) -> Result<Vec<f32>> {
		Ok(standardize::standardize(
			vector,
			&statistics.mean,
			&statistics.std,
			self.cfg.standardization.epsilon,
		)?)
	}
}
