use std::collections::HashSet;

use lull_domain::standardize::standardize;
use lull_service::{Error, PredictRequest, stores::StatisticsStore};

use super::{DIM, Harness, OWNER, SpyGenerator, IndexHook};

async fn seed_owner(harness: &Harness, count: usize) -> Vec<uuid::Uuid> {
	let mut items = Vec::with_capacity(count);

	for index in 0..count {
		let step = index as f32;

		items.push(
			harness.seed_labeled(OWNER, vec![step, 2.0 * step - 3.0, 0.5, -step], "hungry").await,
		);
	}

	items
}

#[tokio::test]
async fn index_matches_new_statistics_after_recompute() {
	let harness = Harness::new(SpyGenerator::unavailable());
	let mut items = Vec::new();

	// Entries first land in the index under identity statistics.
	for index in 0..6 {
		let step = index as f32;
		let item_id = harness.add_item(OWNER, vec![step, step * step, 1.0 - step, 4.0], None);

		harness
			.service
			.predict(PredictRequest { item_id, owner_id: OWNER.to_string() })
			.await;
		items.push(item_id);
	}

	let report = harness.service.recompute_owner(OWNER).await.expect("recompute failed");

	assert_eq!(report.sample_count, 6);
	assert_eq!(report.generation, 1);
	assert_eq!(report.resynced_count, 6);
	assert_eq!(report.missing_item_count, 0);
	assert_eq!(report.error_count, 0);

	let statistics = harness
		.store
		.get_statistics(OWNER)
		.await
		.expect("get_statistics failed")
		.expect("statistics must exist");
	let raw = harness.service.get_raw_batch(&items).await.expect("get_raw_batch failed");

	assert_eq!(raw.len(), items.len());

	for record in raw {
		let expected = standardize(
			&record.vector,
			&statistics.mean,
			&statistics.std,
			harness.service.cfg.standardization.epsilon,
		)
		.expect("standardize failed");
		let entry = harness.index.entry(record.item_id).expect("entry must exist");

		assert_eq!(entry.vector, expected, "item {}", record.item_id);
		assert_eq!(entry.owner_id, OWNER);
	}
}

#[tokio::test]
async fn constant_dimension_keeps_entries_finite() {
	let harness = Harness::new(SpyGenerator::unavailable());

	seed_owner(&harness, 5).await;

	let report = harness.recompute(OWNER).await;
	let statistics = harness
		.store
		.get_statistics(OWNER)
		.await
		.expect("get_statistics failed")
		.expect("statistics must exist");

	assert_eq!(report.resynced_count, 5);
	assert_eq!(statistics.std[2], 0.0);
	assert_eq!(statistics.mean[2], 0.5);
	assert_eq!(harness.index.len(), 5);

	for item_id in seed_ids(&harness).await {
		let entry = harness.index.entry(item_id).expect("entry must exist");

		assert!(entry.vector.iter().all(|value| value.is_finite()), "entry {entry:?}");
		assert_eq!(entry.vector[2], 0.0);
		assert!(entry.label_present);
	}
}

async fn seed_ids(harness: &Harness) -> Vec<uuid::Uuid> {
	use lull_service::stores::RawVectorStore;

	harness
		.store
		.list_for_owner(OWNER)
		.await
		.expect("list_for_owner failed")
		.into_iter()
		.map(|record| record.item_id)
		.collect()
}

#[tokio::test]
async fn owner_without_vectors_is_empty_input() {
	let harness = Harness::new(SpyGenerator::unavailable());

	harness.service.get_or_init_statistics(OWNER).await.expect("init failed");

	let err = harness.service.recompute_owner(OWNER).await.expect_err("recompute must fail");

	assert!(matches!(err, Error::EmptyInput), "error {err:?}");
	assert!(!err.is_retryable());
}

#[tokio::test]
async fn owner_without_statistics_is_reported_removed() {
	let harness = Harness::new(SpyGenerator::unavailable());

	seed_owner(&harness, 3).await;

	let err = harness.service.recompute_owner(OWNER).await.expect_err("recompute must fail");

	assert!(matches!(err, Error::OwnerRemoved { .. }), "error {err:?}");
	assert!(harness.index.is_empty());
}

#[tokio::test]
async fn raw_vector_without_item_is_counted_missing() {
	let harness = Harness::new(SpyGenerator::unavailable());

	seed_owner(&harness, 3).await;
	harness
		.service
		.store_raw(uuid::Uuid::from_u128(777), OWNER, &[0.0, 0.0, 0.0, 0.0])
		.await
		.expect("store_raw failed");

	let report = harness.recompute(OWNER).await;

	assert_eq!(report.sample_count, 4);
	assert_eq!(report.resynced_count, 3);
	assert_eq!(report.missing_item_count, 1);
	assert!(harness.index.entry(uuid::Uuid::from_u128(777)).is_none());
}

#[tokio::test]
async fn single_upsert_failure_does_not_stop_the_job() {
	let harness = Harness::with_index_hook(IndexHook::FailFor(HashSet::from([
		uuid::Uuid::from_u128(2),
	])));
	let items = seed_owner(&harness, 4).await;

	assert_eq!(items[1], uuid::Uuid::from_u128(2));

	let report = harness.recompute(OWNER).await;

	assert_eq!(report.resynced_count, 3);
	assert_eq!(report.error_count, 1);
	assert!(harness.index.entry(items[1]).is_none());
	assert!(harness.index.entry(items[3]).is_some());
}

#[tokio::test]
async fn statistics_write_failure_aborts_before_indexing() {
	let harness = Harness::with_failing_statistics();

	seed_owner(&harness, 4).await;
	harness.service.get_or_init_statistics(OWNER).await.expect("init failed");

	let err = harness.service.recompute_owner(OWNER).await.expect_err("recompute must fail");

	assert!(matches!(err, Error::Persistence { .. }), "error {err:?}");
	assert!(err.is_retryable());
	assert!(harness.index.is_empty());

	let statistics = harness
		.store
		.get_statistics(OWNER)
		.await
		.expect("get_statistics failed")
		.expect("statistics must exist");

	assert_eq!(statistics.generation, 0);
	assert_eq!(statistics.std, vec![1.0; DIM]);
}

#[tokio::test]
async fn owner_removed_mid_job_stops_the_job() {
	let harness = Harness::with_index_hook(IndexHook::RemoveOwner);

	seed_owner(&harness, 4).await;
	harness.service.get_or_init_statistics(OWNER).await.expect("init failed");

	let err = harness.service.recompute_owner(OWNER).await.expect_err("recompute must fail");

	assert!(matches!(err, Error::OwnerRemoved { .. }), "error {err:?}");
	assert_eq!(harness.index.len(), 1);
}

#[tokio::test]
async fn newer_generation_supersedes_the_job() {
	let harness = Harness::with_index_hook(IndexHook::BumpGeneration);

	seed_owner(&harness, 4).await;
	harness.service.get_or_init_statistics(OWNER).await.expect("init failed");

	let err = harness.service.recompute_owner(OWNER).await.expect_err("recompute must fail");

	match &err {
		Error::Superseded { expected, found, .. } => {
			assert_eq!(*expected, 1);
			assert_eq!(*found, 2);
		},
		other => panic!("Expected superseded, got {other:?}."),
	}

	assert!(err.is_retryable());
}

#[tokio::test]
async fn concurrent_first_use_sees_one_identity_row() {
	let harness = Harness::new(SpyGenerator::unavailable());
	let (a, b, c) = tokio::join!(
		harness.service.get_or_init_statistics(OWNER),
		harness.service.get_or_init_statistics(OWNER),
		harness.service.get_or_init_statistics(OWNER),
	);
	let a = a.expect("init failed");

	assert_eq!(a, b.expect("init failed"));
	assert_eq!(a, c.expect("init failed"));
	assert_eq!(a.generation, 0);
	assert_eq!(a.sample_count, 0);
	assert_eq!(a.mean, vec![0.0; DIM]);
	assert_eq!(a.std, vec![1.0; DIM]);
}

#[tokio::test]
async fn compute_statistics_rejects_wrong_dimension() {
	let harness = Harness::new(SpyGenerator::unavailable());
	let err = harness
		.service
		.compute_statistics(&[vec![1.0_f32; DIM], vec![1.0; DIM - 1]])
		.expect_err("compute must fail");

	assert!(matches!(err, Error::Validation { .. }), "error {err:?}");
}
