use sqlx::PgExecutor;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Result, models::ItemRow};

pub const SOURCE_USER: &str = "user";
pub const SOURCE_AI: &str = "ai";

const ITEM_COLUMNS: &str = "\
item_id,
	owner_id,
	label,
	label_source,
	resolution,
	resolution_source,
	notes,
	validated,
	audio_ref,
	image_url,
	recorded_at,
	created_at,
	updated_at";

pub struct NewItem<'a> {
	pub item_id: Uuid,
	pub owner_id: &'a str,
	pub audio_ref: &'a str,
	pub image_url: Option<&'a str>,
	pub recorded_at: OffsetDateTime,
}

/// Fields a user confirms or corrects. `None` leaves the stored value untouched.
#[derive(Debug, Default)]
pub struct LabelUpdate<'a> {
	pub label: Option<&'a str>,
	pub resolution: Option<&'a str>,
	pub notes: Option<&'a str>,
	pub validated: Option<bool>,
}

pub async fn insert_item<'e, E>(executor: E, item: &NewItem<'_>, now: OffsetDateTime) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
INSERT INTO items (item_id, owner_id, audio_ref, image_url, recorded_at, created_at, updated_at)
VALUES ($1, $2, $3, $4, $5, $6, $6)",
	)
	.bind(item.item_id)
	.bind(item.owner_id)
	.bind(item.audio_ref)
	.bind(item.image_url)
	.bind(item.recorded_at)
	.bind(now)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn get_item<'e, E>(executor: E, item_id: Uuid) -> Result<Option<ItemRow>>
where
	E: PgExecutor<'e>,
{
	let sql = format!("SELECT {ITEM_COLUMNS} FROM items WHERE item_id = $1");
	let row = sqlx::query_as::<_, ItemRow>(&sql).bind(item_id).fetch_optional(executor).await?;

	Ok(row)
}

pub async fn get_items<'e, E>(executor: E, item_ids: &[Uuid]) -> Result<Vec<ItemRow>>
where
	E: PgExecutor<'e>,
{
	if item_ids.is_empty() {
		return Ok(Vec::new());
	}

	let sql = format!("SELECT {ITEM_COLUMNS} FROM items WHERE item_id = ANY($1)");
	let rows = sqlx::query_as::<_, ItemRow>(&sql).bind(item_ids).fetch_all(executor).await?;

	Ok(rows)
}

/// Counts items a user has validated with a non-blank label.
pub async fn count_labeled_items<'e, E>(executor: E, owner_id: &str) -> Result<i64>
where
	E: PgExecutor<'e>,
{
	let count: i64 = sqlx::query_scalar(
		"\
SELECT count(*)
FROM items
WHERE owner_id = $1
	AND validated IS TRUE
	AND label IS NOT NULL
	AND btrim(label) <> ''",
	)
	.bind(owner_id)
	.fetch_one(executor)
	.await?;

	Ok(count)
}

/// Writes a generated prediction. The item stays unvalidated until a user confirms it.
pub async fn save_ai_prediction<'e, E>(
	executor: E,
	item_id: Uuid,
	label: &str,
	resolution: &str,
	notes: Option<&str>,
	now: OffsetDateTime,
) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"\
UPDATE items
SET
	label = $2,
	label_source = $3,
	resolution = $4,
	resolution_source = $3,
	notes = $5,
	validated = NULL,
	updated_at = $6
WHERE item_id = $1",
	)
	.bind(item_id)
	.bind(label)
	.bind(SOURCE_AI)
	.bind(resolution)
	.bind(notes)
	.bind(now)
	.execute(executor)
	.await?;

	Ok(result.rows_affected() > 0)
}

pub async fn update_item_labels<'e, E>(
	executor: E,
	item_id: Uuid,
	owner_id: &str,
	update: &LabelUpdate<'_>,
	now: OffsetDateTime,
) -> Result<Option<ItemRow>>
where
	E: PgExecutor<'e>,
{
	let sql = format!(
		"\
UPDATE items
SET
	label = COALESCE($3::text, label),
	label_source = CASE WHEN $3::text IS NULL THEN label_source ELSE $7 END,
	resolution = COALESCE($4::text, resolution),
	resolution_source = CASE WHEN $4::text IS NULL THEN resolution_source ELSE $7 END,
	notes = COALESCE($5::text, notes),
	validated = COALESCE($6::boolean, validated),
	updated_at = $8
WHERE item_id = $1 AND owner_id = $2
RETURNING {ITEM_COLUMNS}"
	);
	let row = sqlx::query_as::<_, ItemRow>(&sql)
		.bind(item_id)
		.bind(owner_id)
		.bind(update.label)
		.bind(update.resolution)
		.bind(update.notes)
		.bind(update.validated)
		.bind(SOURCE_USER)
		.bind(now)
		.fetch_optional(executor)
		.await?;

	Ok(row)
}
