pub mod confirm;
pub mod embeddings;
pub mod index;
pub mod locks;
pub mod memory;
pub mod pg;
pub mod predict;
pub mod prompt;
pub mod recompute;
pub mod statistics;
pub mod stores;
pub mod time_serde;

mod error;

pub use confirm::ConfirmLabelRequest;
pub use error::{Error, Result};
pub use predict::{
	NeighborUsed, PredictError, PredictRequest, PredictResponse, PredictStatus, Prediction,
	PredictionState,
};
pub use recompute::RecomputeReport;
pub use stores::Stores;

use std::{future::Future, pin::Pin, sync::Arc};

use serde_json::Value;

use lull_config::{Config, FeatureProviderConfig, GenerationProviderConfig};
use lull_providers::{features, generation};
use lull_storage::{db::Db, qdrant::QdrantStore};

use crate::{
	index::QdrantIndex,
	locks::OwnerLocks,
	memory::{MemoryIndex, MemoryStore},
	pg::{PgRecomputeScheduler, PgStore},
	stores::RecomputeScheduler,
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait FeatureExtractor
where
	Self: Send + Sync,
{
	fn extract<'a>(
		&'a self,
		cfg: &'a FeatureProviderConfig,
		audio_ref: &'a str,
	) -> BoxFuture<'a, lull_providers::Result<Vec<f32>>>;
}

pub trait LabelGenerator
where
	Self: Send + Sync,
{
	fn generate<'a>(
		&'a self,
		cfg: &'a GenerationProviderConfig,
		messages: &'a [Value],
	) -> BoxFuture<'a, lull_providers::Result<Value>>;
}

#[derive(Clone)]
pub struct Providers {
	pub features: Arc<dyn FeatureExtractor>,
	pub generation: Arc<dyn LabelGenerator>,
}
impl Providers {
	pub fn new(features: Arc<dyn FeatureExtractor>, generation: Arc<dyn LabelGenerator>) -> Self {
		Self { features, generation }
	}
}
impl Default for Providers {
	fn default() -> Self {
		let provider = Arc::new(HttpProviders);

		Self { features: provider.clone(), generation: provider }
	}
}

struct HttpProviders;
impl FeatureExtractor for HttpProviders {
	fn extract<'a>(
		&'a self,
		cfg: &'a FeatureProviderConfig,
		audio_ref: &'a str,
	) -> BoxFuture<'a, lull_providers::Result<Vec<f32>>> {
		Box::pin(features::extract(cfg, audio_ref))
	}
}
impl LabelGenerator for HttpProviders {
	fn generate<'a>(
		&'a self,
		cfg: &'a GenerationProviderConfig,
		messages: &'a [Value],
	) -> BoxFuture<'a, lull_providers::Result<Value>> {
		Box::pin(generation::generate(cfg, messages))
	}
}

impl Stores {
	/// Postgres stores, the Qdrant index, and durable recompute jobs.
	pub fn production(db: &Db, qdrant: QdrantStore) -> Self {
		let pg = Arc::new(PgStore::new(db.pool.clone()));

		Self {
			raw: pg.clone(),
			statistics: pg.clone(),
			labels: pg,
			index: Arc::new(QdrantIndex::new(qdrant)),
			scheduler: Arc::new(PgRecomputeScheduler::new(db.pool.clone())),
		}
	}

	pub fn in_memory(
		store: Arc<MemoryStore>,
		index: Arc<MemoryIndex>,
		scheduler: Arc<dyn RecomputeScheduler>,
	) -> Self {
		Self { raw: store.clone(), statistics: store.clone(), labels: store, index, scheduler }
	}
}

pub struct LullService {
	pub cfg: Config,
	pub stores: Stores,
	pub providers: Providers,
	locks: OwnerLocks,
}
impl LullService {
	pub fn new(cfg: Config, db: &Db, qdrant: QdrantStore) -> Self {
		Self::with_stores(cfg, Stores::production(db, qdrant), Providers::default())
	}

	pub fn with_stores(cfg: Config, stores: Stores, providers: Providers) -> Self {
		Self { cfg, stores, providers, locks: OwnerLocks::new() }
	}

	pub fn vector_dim(&self) -> usize {
		self.cfg.storage.qdrant.vector_dim as usize
	}

	pub(crate) fn locks(&self) -> &OwnerLocks {
		&self.locks
	}
}
