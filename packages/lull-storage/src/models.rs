use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Result, vector};

#[derive(Debug, sqlx::FromRow)]
pub struct RawEmbeddingRow {
	pub item_id: Uuid,
	pub owner_id: String,
	pub vec_text: String,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}
impl RawEmbeddingRow {
	pub fn vector(&self) -> Result<Vec<f32>> {
		vector::parse_vector_text(&self.vec_text)
	}
}

#[derive(Debug, sqlx::FromRow)]
pub struct UserStatisticsRow {
	pub owner_id: String,
	pub mean_text: String,
	pub std_text: String,
	pub sample_count: i64,
	pub generation: i64,
	pub updated_at: OffsetDateTime,
}
impl UserStatisticsRow {
	pub fn mean(&self) -> Result<Vec<f32>> {
		vector::parse_vector_text(&self.mean_text)
	}

	pub fn std(&self) -> Result<Vec<f32>> {
		vector::parse_vector_text(&self.std_text)
	}
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ItemRow {
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
	pub recorded_at: OffsetDateTime,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

#[derive(Debug, sqlx::FromRow)]
pub struct PredictionJob {
	pub job_id: Uuid,
	pub op: String,
	pub owner_id: String,
	pub item_id: Option<Uuid>,
	pub status: String,
	pub attempts: i32,
	pub last_error: Option<String>,
	pub available_at: OffsetDateTime,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}
