use std::time::Duration as StdDuration;

use time::{Duration, OffsetDateTime};
use tokio::time as tokio_time;

use lull_service::{LullService, PredictRequest};
use lull_storage::{
	db::Db,
	jobs::{self, OP_PREDICT, OP_RECOMPUTE},
	models::PredictionJob,
	owner_lock,
};

use crate::Result;

const BASE_BACKOFF_MS: i64 = 500;
const MAX_BACKOFF_MS: i64 = 30_000;
const MAX_JOB_ERROR_CHARS: usize = 1_024;
const REDACTED: &str = "[REDACTED]";
const SECRET_NAMES: [&str; 7] = ["apikey", "key", "password", "secret", "sig", "signature", "token"];

pub struct WorkerState {
	pub db: Db,
	pub service: LullService,
	pub cfg: lull_config::Worker,
}

enum JobOutcome {
	Done,
	Retry(String),
	Fatal(String),
}

pub async fn run_worker(state: WorkerState) -> Result<()> {
	let poll_interval = StdDuration::from_millis(state.cfg.poll_interval_ms);

	loop {
		match process_job_once(&state).await {
			// Keep draining while jobs are available.
			Ok(true) => continue,
			Ok(false) => {},
			Err(err) => tracing::error!(error = %err, "Prediction job processing failed."),
		}

		tokio_time::sleep(poll_interval).await;
	}
}

async fn process_job_once(state: &WorkerState) -> Result<bool> {
	let now = OffsetDateTime::now_utc();
	let Some(job) = jobs::claim_next_job(&state.db, now, state.cfg.claim_lease_seconds).await?
	else {
		return Ok(false);
	};
	let Some(lease) = owner_lock::try_lock_owner(&state.db, &job.owner_id).await? else {
		jobs::defer_job(&state.db, job.job_id, now + retry_delay(1), now).await?;

		tracing::debug!(
			job_id = %job.job_id,
			owner_id = %job.owner_id,
			"Owner is busy in another worker. Job deferred."
		);

		return Ok(true);
	};
	let outcome = match job.op.as_str() {
		OP_PREDICT => handle_predict(&state.service, &job).await,
		OP_RECOMPUTE => handle_recompute(&state.service, &job).await,
		other => JobOutcome::Fatal(format!("Unsupported job op: {other}.")),
	};

	if let Err(err) = lease.release().await {
		tracing::warn!(owner_id = %job.owner_id, error = %err, "Owner lock release failed.");
	}

	match outcome {
		JobOutcome::Done => {
			jobs::mark_job_done(&state.db, job.job_id, OffsetDateTime::now_utc()).await?;
		},
		JobOutcome::Retry(message) => mark_failed(state, &job, &message, true).await?,
		JobOutcome::Fatal(message) => mark_failed(state, &job, &message, false).await?,
	}

	Ok(true)
}

async fn handle_predict(service: &LullService, job: &PredictionJob) -> JobOutcome {
	let Some(item_id) = job.item_id else {
		return JobOutcome::Fatal("Predict job has no item id.".to_string());
	};
	let response =
		service.predict(PredictRequest { item_id, owner_id: job.owner_id.clone() }).await;

	match response.error {
		None => {
			tracing::info!(
				job_id = %job.job_id,
				item_id = %item_id,
				status = ?response.status,
				recompute_scheduled = response.recompute_scheduled,
				"Predict job finished."
			);

			JobOutcome::Done
		},
		Some(error) if error.retryable => JobOutcome::Retry(error.message),
		Some(error) => JobOutcome::Fatal(error.message),
	}
}

async fn handle_recompute(service: &LullService, job: &PredictionJob) -> JobOutcome {
	match service.recompute_owner(&job.owner_id).await {
		Ok(report) => {
			tracing::info!(
				job_id = %job.job_id,
				owner_id = %report.owner_id,
				generation = report.generation,
				errors = report.error_count,
				"Recompute job finished."
			);

			JobOutcome::Done
		},
		Err(lull_service::Error::OwnerRemoved { owner_id }) => {
			tracing::info!(
				job_id = %job.job_id,
				owner_id = %owner_id,
				"Owner removed. Dropping recompute job."
			);

			JobOutcome::Done
		},
		Err(err) if err.is_retryable() => JobOutcome::Retry(err.to_string()),
		Err(err) => JobOutcome::Fatal(err.to_string()),
	}
}

async fn mark_failed(
	state: &WorkerState,
	job: &PredictionJob,
	message: &str,
	retryable: bool,
) -> Result<()> {
	let next_attempts = job.attempts.saturating_add(1);
	let now = OffsetDateTime::now_utc();
	let available_at = retry_at(retryable, next_attempts, state.cfg.max_attempts, now);
	let error_text = sanitize_job_error(message);

	if available_at.is_none() {
		tracing::error!(
			job_id = %job.job_id,
			op = %job.op,
			attempts = next_attempts,
			error = %error_text,
			"Prediction job abandoned."
		);
	} else {
		tracing::warn!(
			job_id = %job.job_id,
			op = %job.op,
			attempts = next_attempts,
			error = %error_text,
			"Prediction job failed. Retrying."
		);
	}

	jobs::mark_job_failed(&state.db, job.job_id, next_attempts, &error_text, available_at, now)
		.await?;

	Ok(())
}

fn retry_at(
	retryable: bool,
	attempts: i32,
	max_attempts: i32,
	now: OffsetDateTime,
) -> Option<OffsetDateTime> {
	(retryable && attempts < max_attempts).then(|| now + retry_delay(attempts))
}

/// 500 ms before the first retry, doubling with each attempt up to 30 s.
fn retry_delay(attempt: i32) -> Duration {
	let doublings = attempt.saturating_sub(1).clamp(0, 16) as u32;
	let delay = 2_i64
		.checked_pow(doublings)
		.and_then(|factor| BASE_BACKOFF_MS.checked_mul(factor))
		.unwrap_or(MAX_BACKOFF_MS);

	Duration::milliseconds(delay.min(MAX_BACKOFF_MS))
}

/// Job errors quote provider URLs, audio references and DSNs. Credentials in any of them are
/// replaced before the text is stored.
fn sanitize_job_error(text: &str) -> String {
	let mut words = Vec::new();
	let mut after_bearer = false;

	for word in text.split_whitespace() {
		if after_bearer {
			words.push(REDACTED.to_string());
			after_bearer = false;

			continue;
		}

		after_bearer = word.eq_ignore_ascii_case("bearer");

		words.push(redact_word(word));
	}

	let joined = words.join(" ");

	if joined.chars().count() <= MAX_JOB_ERROR_CHARS {
		return joined;
	}

	let mut out: String = joined.chars().take(MAX_JOB_ERROR_CHARS).collect();

	out.push_str("...");

	out
}

fn redact_word(word: &str) -> String {
	if word.starts_with("sk-") {
		return REDACTED.to_string();
	}
	if let Some((scheme, rest)) = word.split_once("://") {
		return format!("{scheme}://{}", redact_url(rest));
	}

	for separator in ['=', ':'] {
		if let Some((name, value)) = word.split_once(separator)
			&& !value.is_empty()
			&& is_secret_name(name)
		{
			return format!("{name}{separator}{REDACTED}");
		}
	}

	word.to_string()
}

/// Redacts the password of `user:password@host` and secret query parameter values.
fn redact_url(rest: &str) -> String {
	let (location, query) = match rest.split_once('?') {
		Some((location, query)) => (location, Some(query)),
		None => (rest, None),
	};
	let mut out = match location.split_once('@') {
		Some((userinfo, host)) if !userinfo.contains('/') => match userinfo.split_once(':') {
			Some((user, _)) => format!("{user}:{REDACTED}@{host}"),
			None => location.to_string(),
		},
		_ => location.to_string(),
	};

	if let Some(query) = query {
		let params: Vec<String> = query
			.split('&')
			.map(|pair| match pair.split_once('=') {
				Some((name, _)) if is_secret_name(name) => format!("{name}={REDACTED}"),
				_ => pair.to_string(),
			})
			.collect();

		out.push('?');
		out.push_str(&params.join("&"));
	}

	out
}

fn is_secret_name(name: &str) -> bool {
	let name = name
		.trim_matches(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-'))
		.to_ascii_lowercase();

	SECRET_NAMES.iter().any(|secret| {
		name == *secret
			|| name
				.strip_suffix(*secret)
				.is_some_and(|head| head.ends_with('_') || head.ends_with('-'))
	})
}
