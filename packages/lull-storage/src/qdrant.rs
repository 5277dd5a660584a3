use qdrant_client::qdrant::{
	CreateCollectionBuilder, CreateFieldIndexCollectionBuilder, Distance, FieldType,
	VectorParamsBuilder,
};

use crate::Result;

pub const OWNER_ID_KEY: &str = "owner_id";
pub const LABEL_PRESENT_KEY: &str = "label_present";
pub const TIMESTAMP_KEY: &str = "timestamp";

pub struct QdrantStore {
	pub client: qdrant_client::Qdrant,
	pub collection: String,
	pub vector_dim: u32,
}
impl QdrantStore {
	pub fn new(cfg: &lull_config::Qdrant) -> Result<Self> {
		let client = qdrant_client::Qdrant::from_url(&cfg.url).build()?;

		Ok(Self { client, collection: cfg.collection.clone(), vector_dim: cfg.vector_dim })
	}

	/// Creates the cosine collection and its payload indexes when the collection is absent.
	pub async fn ensure_collection(&self) -> Result<()> {
		if self.client.collection_exists(self.collection.clone()).await? {
			return Ok(());
		}

		self.client
			.create_collection(CreateCollectionBuilder::new(self.collection.clone()).vectors_config(
				VectorParamsBuilder::new(u64::from(self.vector_dim), Distance::Cosine),
			))
			.await?;

		for (field, kind) in [(OWNER_ID_KEY, FieldType::Keyword), (LABEL_PRESENT_KEY, FieldType::Bool)]
		{
			self.client
				.create_field_index(
					CreateFieldIndexCollectionBuilder::new(self.collection.clone(), field, kind)
						.wait(true),
				)
				.await?;
		}

		tracing::info!(
			collection = %self.collection,
			vector_dim = self.vector_dim,
			"Created Qdrant collection."
		);

		Ok(())
	}
}
