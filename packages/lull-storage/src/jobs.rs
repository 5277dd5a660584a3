use sqlx::PgExecutor;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Result, db::Db, models::PredictionJob};

pub const OP_PREDICT: &str = "PREDICT";
pub const OP_RECOMPUTE: &str = "RECOMPUTE";

pub async fn enqueue_predict_job<'e, E>(
	executor: E,
	owner_id: &str,
	item_id: Uuid,
	now: OffsetDateTime,
) -> Result<Uuid>
where
	E: PgExecutor<'e>,
{
	let job_id = Uuid::new_v4();

	sqlx::query(
		"\
INSERT INTO prediction_jobs (job_id, op, owner_id, item_id, status, available_at, created_at, updated_at)
VALUES ($1, $2, $3, $4, 'PENDING', $5, $5, $5)",
	)
	.bind(job_id)
	.bind(OP_PREDICT)
	.bind(owner_id)
	.bind(item_id)
	.bind(now)
	.execute(executor)
	.await?;

	Ok(job_id)
}

/// Enqueues a recompute for an owner. Returns `false` when one is already pending, since a single
/// run reads every raw vector the owner has at that time.
pub async fn enqueue_recompute_job<'e, E>(
	executor: E,
	owner_id: &str,
	now: OffsetDateTime,
) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"\
INSERT INTO prediction_jobs (job_id, op, owner_id, status, available_at, created_at, updated_at)
VALUES ($1, $2, $3, 'PENDING', $4, $4, $4)
ON CONFLICT (owner_id) WHERE op = 'RECOMPUTE' AND status = 'PENDING' DO NOTHING",
	)
	.bind(Uuid::new_v4())
	.bind(OP_RECOMPUTE)
	.bind(owner_id)
	.bind(now)
	.execute(executor)
	.await?;

	Ok(result.rows_affected() > 0)
}

pub async fn claim_next_job(
	db: &Db,
	now: OffsetDateTime,
	lease_seconds: i64,
) -> Result<Option<PredictionJob>> {
	let mut tx = db.pool.begin().await?;
	let row = sqlx::query_as::<_, PredictionJob>(
		"\
SELECT
	job_id,
	op,
	owner_id,
	item_id,
	status,
	attempts,
	last_error,
	available_at,
	created_at,
	updated_at
FROM prediction_jobs
WHERE status IN ('PENDING','FAILED','CLAIMED') AND available_at <= $1
ORDER BY available_at ASC
LIMIT 1
FOR UPDATE SKIP LOCKED",
	)
	.bind(now)
	.fetch_optional(&mut *tx)
	.await?;
	let job = if let Some(mut job) = row {
		let lease_until = now + time::Duration::seconds(lease_seconds);

		sqlx::query(
			"UPDATE prediction_jobs SET status = 'CLAIMED', available_at = $1, updated_at = $2 WHERE job_id = $3",
		)
		.bind(lease_until)
		.bind(now)
		.bind(job.job_id)
		.execute(&mut *tx)
		.await?;

		job.status = "CLAIMED".to_string();
		job.available_at = lease_until;
		job.updated_at = now;

		Some(job)
	} else {
		None
	};

	tx.commit().await?;

	Ok(job)
}

pub async fn mark_job_done(db: &Db, job_id: Uuid, now: OffsetDateTime) -> Result<()> {
	sqlx::query("UPDATE prediction_jobs SET status = 'DONE', updated_at = $1 WHERE job_id = $2")
		.bind(now)
		.bind(job_id)
		.execute(&db.pool)
		.await?;

	Ok(())
}

/// Pushes a claimed job back without counting an attempt.
pub async fn defer_job(
	db: &Db,
	job_id: Uuid,
	available_at: OffsetDateTime,
	now: OffsetDateTime,
) -> Result<()> {
	sqlx::query(
		"UPDATE prediction_jobs SET available_at = $1, updated_at = $2 WHERE job_id = $3 AND status = 'CLAIMED'",
	)
	.bind(available_at)
	.bind(now)
	.bind(job_id)
	.execute(&db.pool)
	.await?;

	Ok(())
}

/// Records a failed attempt. Without a retry time the job is moved to `DEAD` and never claimed again.
pub async fn mark_job_failed(
	db: &Db,
	job_id: Uuid,
	attempts: i32,
	error_text: &str,
	available_at: Option<OffsetDateTime>,
	now: OffsetDateTime,
) -> Result<()> {
	let status = if available_at.is_some() { "FAILED" } else { "DEAD" };

	sqlx::query(
		"\
UPDATE prediction_jobs
SET status = $1,
	attempts = $2,
	last_error = $3,
	available_at = COALESCE($4, available_at),
	updated_at = $5
WHERE job_id = $6",
	)
	.bind(status)
	.bind(attempts)
	.bind(error_text)
	.bind(available_at)
	.bind(now)
	.bind(job_id)
	.execute(&db.pool)
	.await?;

	Ok(())
}
