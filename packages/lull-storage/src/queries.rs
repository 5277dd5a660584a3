use sqlx::PgExecutor;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	Error, Result,
	models::{RawEmbeddingRow, UserStatisticsRow},
};

pub async fn upsert_raw_embedding<'e, E>(
	executor: E,
	item_id: Uuid,
	owner_id: &str,
	vec_text: &str,
	now: OffsetDateTime,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
INSERT INTO raw_embeddings (item_id, owner_id, vec, created_at, updated_at)
VALUES ($1, $2, $3::text::vector, $4, $4)
ON CONFLICT (item_id) DO UPDATE
SET
	owner_id = EXCLUDED.owner_id,
	vec = EXCLUDED.vec,
	updated_at = EXCLUDED.updated_at",
	)
	.bind(item_id)
	.bind(owner_id)
	.bind(vec_text)
	.bind(now)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn get_raw_embeddings<'e, E>(executor: E, item_ids: &[Uuid]) -> Result<Vec<RawEmbeddingRow>>
where
	E: PgExecutor<'e>,
{
	if item_ids.is_empty() {
		return Ok(Vec::new());
	}

	let rows = sqlx::query_as::<_, RawEmbeddingRow>(
		"\
SELECT item_id, owner_id, vec::text AS vec_text, created_at, updated_at
FROM raw_embeddings
WHERE item_id = ANY($1)
ORDER BY item_id ASC",
	)
	.bind(item_ids)
	.fetch_all(executor)
	.await?;

	Ok(rows)
}

pub async fn list_raw_embeddings_for_owner<'e, E>(
	executor: E,
	owner_id: &str,
) -> Result<Vec<RawEmbeddingRow>>
where
	E: PgExecutor<'e>,
{
	let rows = sqlx::query_as::<_, RawEmbeddingRow>(
		"\
SELECT item_id, owner_id, vec::text AS vec_text, created_at, updated_at
FROM raw_embeddings
WHERE owner_id = $1
ORDER BY item_id ASC",
	)
	.bind(owner_id)
	.fetch_all(executor)
	.await?;

	Ok(rows)
}

pub async fn count_raw_embeddings_for_owner<'e, E>(executor: E, owner_id: &str) -> Result<i64>
where
	E: PgExecutor<'e>,
{
	let count: i64 = sqlx::query_scalar("SELECT count(*) FROM raw_embeddings WHERE owner_id = $1")
		.bind(owner_id)
		.fetch_one(executor)
		.await?;

	Ok(count)
}

pub async fn get_user_statistics<'e, E>(
	executor: E,
	owner_id: &str,
) -> Result<Option<UserStatisticsRow>>
where
	E: PgExecutor<'e>,
{
	let row = sqlx::query_as::<_, UserStatisticsRow>(
		"\
SELECT
	owner_id,
	mean::text AS mean_text,
	std::text AS std_text,
	sample_count,
	generation,
	updated_at
FROM user_embedding_stats
WHERE owner_id = $1",
	)
	.bind(owner_id)
	.fetch_optional(executor)
	.await?;

	Ok(row)
}

/// Inserts the identity statistics row. Concurrent first inserts collapse into one row, so the
/// caller must re-read afterwards.
pub async fn insert_identity_statistics<'e, E>(
	executor: E,
	owner_id: &str,
	mean_text: &str,
	std_text: &str,
	now: OffsetDateTime,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
INSERT INTO user_embedding_stats (owner_id, mean, std, sample_count, generation, updated_at)
VALUES ($1, $2::text::vector, $3::text::vector, 0, 0, $4)
ON CONFLICT (owner_id) DO NOTHING",
	)
	.bind(owner_id)
	.bind(mean_text)
	.bind(std_text)
	.bind(now)
	.execute(executor)
	.await?;

	Ok(())
}

/// Replaces an owner's statistics and bumps the generation. A missing row is reported as
/// [`Error::NotFound`] rather than recreated.
pub async fn update_user_statistics<'e, E>(
	executor: E,
	owner_id: &str,
	mean_text: &str,
	std_text: &str,
	sample_count: i64,
	now: OffsetDateTime,
) -> Result<UserStatisticsRow>
where
	E: PgExecutor<'e>,
{
	let row = sqlx::query_as::<_, UserStatisticsRow>(
		"\
UPDATE user_embedding_stats
SET
	mean = $2::text::vector,
	std = $3::text::vector,
	sample_count = $4,
	generation = generation + 1,
	updated_at = $5
WHERE owner_id = $1
RETURNING
	owner_id,
	mean::text AS mean_text,
	std::text AS std_text,
	sample_count,
	generation,
	updated_at",
	)
	.bind(owner_id)
	.bind(mean_text)
	.bind(std_text)
	.bind(sample_count)
	.bind(now)
	.fetch_optional(executor)
	.await?;

	row.ok_or_else(|| Error::NotFound(format!("statistics for owner {owner_id}")))
}

pub async fn delete_user_statistics<'e, E>(executor: E, owner_id: &str) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query("DELETE FROM user_embedding_stats WHERE owner_id = $1")
		.bind(owner_id)
		.execute(executor)
		.await?;

	Ok(result.rows_affected() > 0)
}
