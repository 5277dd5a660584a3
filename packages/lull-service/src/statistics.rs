use time::OffsetDateTime;

use lull_domain::statistics::{self, VectorStatistics};

use crate::{Error, LullService, Result, stores::UserStatistics};

impl LullService {
	/// Returns the owner's statistics, creating the identity transform on first use.
	pub async fn get_or_init_statistics(&self, owner_id: &str) -> Result<UserStatistics> {
		if let Some(existing) = self.stores.statistics.get_statistics(owner_id).await? {
			return Ok(existing);
		}

		self.stores
			.statistics
			.insert_identity(owner_id, self.vector_dim(), OffsetDateTime::now_utc())
			.await?;

		// A concurrent first call may have won the insert; either way one row now exists.
		self.stores.statistics.get_statistics(owner_id).await?.ok_or_else(|| Error::OwnerRemoved {
			owner_id: owner_id.to_string(),
		})
	}

	/// Mean and population standard deviation over `vectors`, each of which must have the
	/// configured dimension.
	pub fn compute_statistics<V>(&self, vectors: &[V]) -> Result<VectorStatistics>
	where
		V: AsRef<[f32]>,
	{
		let expected = self.vector_dim();

		if let Some((index, vector)) =
			vectors.iter().enumerate().find(|(_, vector)| vector.as_ref().len() != expected)
		{
			return Err(Error::validation(format!(
				"Vector {index} has {} dimensions, expected {expected}.",
				vector.as_ref().len()
			)));
		}

		Ok(statistics::compute(vectors)?)
	}
}
