use std::collections::HashSet;

use uuid::Uuid;

use lull_domain::confidence::ConfidenceTier;
use lull_service::{PredictRequest, PredictStatus, PredictionState, stores::SimilarityIndex};

use super::{DIM, Harness, IndexHook, OWNER, SpyGenerator, audio_ref, label_reply};

fn request(item_id: Uuid) -> PredictRequest {
	PredictRequest { item_id, owner_id: OWNER.to_string() }
}

/// Three catalogued cries close to `[1, 1, 0, 0]` and two far from it.
async fn seed_history(harness: &Harness) -> (Uuid, Uuid, Uuid, Vec<Uuid>) {
	let hungry_a = harness.seed_labeled(OWNER, vec![1.0, 0.9, 0.0, 0.1], "hungry").await;
	let hungry_b = harness.seed_labeled(OWNER, vec![0.9, 1.0, 0.1, 0.0], "hungry").await;
	let tired = harness.seed_labeled(OWNER, vec![0.8, 0.8, 0.0, 0.0], "tired").await;
	let far = vec![
		harness.seed_labeled(OWNER, vec![-1.0, -1.0, 1.0, 0.0], "gassy").await,
		harness.seed_labeled(OWNER, vec![-1.0, -1.0, 0.0, 1.0], "gassy").await,
	];

	harness.recompute(OWNER).await;

	(hungry_a, hungry_b, tired, far)
}

#[tokio::test]
async fn insufficient_labels_skip_generation() {
	let harness = Harness::new(SpyGenerator::replying(label_reply("hungry")));

	for offset in 0..4 {
		harness.seed_labeled(OWNER, vec![1.0, offset as f32, 0.0, 0.5], "hungry").await;
	}

	let target = harness.add_item(OWNER, vec![1.0, 1.0, 0.0, 0.0], None);
	let response = harness.service.predict(request(target)).await;

	assert_eq!(response.status, PredictStatus::NeedsManualLabeling);
	assert_eq!(response.state, PredictionState::InsufficientLabels);
	assert_eq!(response.validated_count, Some(4));
	assert_eq!(response.confidence, Some(ConfidenceTier::Insufficient));
	assert!(response.prediction.is_none());
	assert!(harness.generator.calls().is_empty());

	let raw = harness.service.get_raw_batch(&[target]).await.expect("get_raw_batch failed");

	assert_eq!(raw.len(), 1);
	assert_eq!(raw[0].vector, vec![1.0, 1.0, 0.0, 0.0]);

	let entry = harness.index.entry(target).expect("target must be indexed");

	assert!(!entry.label_present);
	assert_eq!(entry.vector.len(), DIM);
}

#[tokio::test]
async fn prediction_uses_nearest_validated_neighbors() {
	let harness = Harness::new(SpyGenerator::replying(label_reply("hungry")));
	let (hungry_a, hungry_b, tired, far) = seed_history(&harness).await;
	let target = harness.add_item(OWNER, vec![1.0, 1.0, 0.0, 0.0], None);
	let response = harness.service.predict(request(target)).await;

	assert_eq!(response.status, PredictStatus::Success, "response {response:?}");
	assert_eq!(response.state, PredictionState::PredictionReady);
	assert_eq!(response.validated_count, Some(5));
	assert_eq!(response.confidence, Some(ConfidenceTier::Low));
	assert!(!response.recompute_scheduled);

	let used: HashSet<Uuid> = response.neighbors.iter().map(|neighbor| neighbor.item_id).collect();

	assert_eq!(used, HashSet::from([hungry_a, hungry_b, tired]));
	assert!(far.iter().all(|item_id| !used.contains(item_id)));
	assert_eq!(response.neighbors[0].item_id, tired);
	assert!(
		response
			.neighbors
			.windows(2)
			.all(|pair| pair[0].similarity >= pair[1].similarity)
	);

	let calls = harness.generator.calls();

	assert_eq!(calls.len(), 1);

	let context = calls[0][1]["content"].as_str().expect("user content must be text");
	let tired_at = context.find("1. Label: tired").expect("closest neighbor must come first");
	let hungry_at = context.find("2. Label: hungry").expect("next neighbor must follow");

	assert!(tired_at < hungry_at);
	assert!(!context.contains("gassy"));

	let prediction = response.prediction.expect("prediction must be returned");

	assert_eq!(prediction.label, "hungry");
	assert_eq!(prediction.resolution, "Try feeding.");

	let saved = harness.item(target).await;

	assert_eq!(saved.label.as_deref(), Some("hungry"));
	assert_eq!(saved.label_source.as_deref(), Some("ai"));
	assert_eq!(saved.resolution_source.as_deref(), Some("ai"));
	assert_eq!(saved.validated, None);
	assert!(!saved.label_present());
}

#[tokio::test]
async fn image_is_forwarded_to_generation() {
	let harness = Harness::new(SpyGenerator::replying(label_reply("hungry")));

	seed_history(&harness).await;

	let target = harness.add_item(OWNER, vec![1.0, 1.0, 0.0, 0.0], None);
	let mut item = harness.item(target).await;

	item.image_url = Some("https://images.example/cry.png".to_string());
	harness.store.insert_item(item);

	let response = harness.service.predict(request(target)).await;

	assert_eq!(response.status, PredictStatus::Success);

	let calls = harness.generator.calls();

	assert_eq!(calls[0][1]["content"][1]["image_url"]["url"], "https://images.example/cry.png");
}

#[tokio::test]
async fn resubmitted_item_is_not_its_own_neighbor() {
	let harness = Harness::new(SpyGenerator::replying(label_reply("hungry")));
	let (hungry_a, ..) = seed_history(&harness).await;
	let response = harness.service.predict(request(hungry_a)).await;

	assert_eq!(response.status, PredictStatus::Success);
	assert_eq!(response.neighbors.len(), 3);
	assert!(response.neighbors.iter().all(|neighbor| neighbor.item_id != hungry_a));
}

#[tokio::test]
async fn labeled_items_without_vectors_yield_no_similar_items() {
	let harness = Harness::new(SpyGenerator::replying(label_reply("hungry")));

	for _ in 0..5 {
		harness.add_item(OWNER, vec![1.0, 0.0, 0.0, 0.0], Some("hungry"));
	}

	let target = harness.add_item(OWNER, vec![1.0, 1.0, 0.0, 0.0], None);
	let response = harness.service.predict(request(target)).await;

	assert_eq!(response.status, PredictStatus::NoSimilarItems);
	assert_eq!(response.state, PredictionState::NoSimilar);
	assert_eq!(response.validated_count, Some(5));
	assert!(harness.generator.calls().is_empty());
}

#[tokio::test]
async fn unvalidated_entries_are_excluded_from_labeled_queries() {
	let harness = Harness::new(SpyGenerator::replying(label_reply("hungry")));
	let mut items = Vec::new();

	for offset in 0..3 {
		let item_id = harness.add_item(OWNER, vec![1.0, offset as f32, 0.5, 0.0], None);

		items.push(item_id);

		let response = harness.service.predict(request(item_id)).await;

		assert_eq!(response.status, PredictStatus::NeedsManualLabeling);
		assert_eq!(response.validated_count, Some(0));
	}

	let probe = [1.0, 1.0, 0.5, 0.0];
	let labeled = harness.index.query_knn(OWNER, &probe, 10, true).await.expect("query failed");
	let all = harness.index.query_knn(OWNER, &probe, 10, false).await.expect("query failed");

	assert!(labeled.is_empty());
	assert_eq!(all.len(), items.len());
}

#[tokio::test]
async fn missing_item_reports_not_found() {
	let harness = Harness::new(SpyGenerator::replying(label_reply("hungry")));
	let response = harness.service.predict(request(Uuid::from_u128(999))).await;

	assert_eq!(response.status, PredictStatus::Error);
	assert_eq!(response.state, PredictionState::Error);
	assert!(!response.recompute_scheduled);

	let error = response.error.expect("error must be reported");

	assert_eq!(error.code, "not_found");
	assert!(!error.retryable);
}

#[tokio::test]
async fn item_of_another_owner_is_not_found() {
	let harness = Harness::new(SpyGenerator::replying(label_reply("hungry")));
	let item_id = harness.add_item("family-b", vec![1.0, 0.0, 0.0, 0.0], None);
	let response = harness.service.predict(request(item_id)).await;

	assert_eq!(response.status, PredictStatus::Error);
	assert_eq!(response.error.map(|error| error.code), Some("not_found"));

	let raw = harness.service.get_raw_batch(&[item_id]).await.expect("get_raw_batch failed");

	assert!(raw.is_empty());
	assert!(harness.index.is_empty());
}

#[tokio::test]
async fn extraction_failure_is_retryable_and_stores_nothing() {
	let harness = Harness::new(SpyGenerator::replying(label_reply("hungry")));
	let item_id = harness.add_item(OWNER, vec![1.0, 0.0, 0.0, 0.0], None);

	harness.features.forget(&audio_ref(OWNER, item_id));

	let response = harness.service.predict(request(item_id)).await;
	let error = response.error.expect("error must be reported");

	assert_eq!(response.status, PredictStatus::Error);
	assert_eq!(error.code, "extraction");
	assert!(error.retryable);
	assert!(harness.service.get_raw_batch(&[item_id]).await.expect("get failed").is_empty());
	assert!(harness.queue.drain().is_empty());
}

#[tokio::test]
async fn wrong_dimension_from_extractor_is_a_validation_error() {
	let harness = Harness::new(SpyGenerator::replying(label_reply("hungry")));
	let item_id = harness.add_item(OWNER, vec![1.0, 0.0, 0.0, 0.0], None);

	harness.features.set(&audio_ref(OWNER, item_id), vec![1.0, 0.0, 0.0]);

	let response = harness.service.predict(request(item_id)).await;
	let error = response.error.expect("error must be reported");

	assert_eq!(error.code, "validation");
	assert!(!error.retryable);
	assert!(harness.index.is_empty());
}

#[tokio::test]
async fn generator_error_reports_prediction_failed() {
	let harness = Harness::new(SpyGenerator::unavailable());

	seed_history(&harness).await;

	let target = harness.add_item(OWNER, vec![1.0, 1.0, 0.0, 0.0], None);
	let response = harness.service.predict(request(target)).await;

	assert_eq!(response.status, PredictStatus::PredictionFailed);
	assert_eq!(response.state, PredictionState::PredictionFailed);
	assert!(response.message.is_some());
	assert!(response.error.is_none());
	assert_eq!(response.neighbors.len(), 3);

	let item = harness.item(target).await;

	assert_eq!(item.label, None);
	assert!(harness.index.entry(target).is_some());
}

#[tokio::test]
async fn malformed_generation_reply_reports_prediction_failed() {
	let harness = Harness::new(SpyGenerator::replying(serde_json::json!({ "label": "hungry" })));

	seed_history(&harness).await;

	let target = harness.add_item(OWNER, vec![1.0, 1.0, 0.0, 0.0], None);
	let response = harness.service.predict(request(target)).await;

	assert_eq!(response.status, PredictStatus::PredictionFailed);
	assert_eq!(harness.item(target).await.label, None);
}

#[tokio::test]
async fn trigger_schedules_once_per_interval() {
	let harness = Harness::new(SpyGenerator::replying(label_reply("hungry")));
	let mut items = Vec::new();

	for offset in 0..5 {
		let item_id = harness.add_item(OWNER, vec![1.0, offset as f32, 0.0, 0.0], None);
		let response = harness.service.predict(request(item_id)).await;

		assert_eq!(response.recompute_scheduled, offset == 4, "submission {offset}");

		items.push(item_id);
	}

	assert_eq!(harness.queue.drain(), vec![OWNER.to_string()]);

	// The count stays at five, and the fifth vector has not been folded in yet.
	let again = harness.service.predict(request(items[4])).await;

	assert!(again.recompute_scheduled);

	harness.queue.drain();
	harness.service.recompute_owner(OWNER).await.expect("recompute failed");

	let after = harness.service.predict(request(items[4])).await;

	assert!(!after.recompute_scheduled);
	assert!(harness.queue.drain().is_empty());
}

#[tokio::test]
async fn trigger_runs_after_failed_generation() {
	let mut cfg = super::test_config(DIM);

	cfg.standardization.recompute_interval = 6;

	let harness = Harness::with_config(cfg, SpyGenerator::unavailable());

	seed_history(&harness).await;

	let target = harness.add_item(OWNER, vec![1.0, 1.0, 0.0, 0.0], None);
	let response = harness.service.predict(request(target)).await;

	assert_eq!(response.status, PredictStatus::PredictionFailed);
	assert!(response.recompute_scheduled);
	assert_eq!(harness.queue.drain(), vec![OWNER.to_string()]);
}

#[tokio::test]
async fn concurrent_predicts_do_not_step_past_the_trigger() {
	let mut cfg = super::test_config(DIM);

	cfg.standardization.recompute_interval = 6;

	let (generator, gate) = SpyGenerator::gated(label_reply("hungry"));
	let harness = Harness::with_config(cfg, generator);

	seed_history(&harness).await;

	let first = harness.add_item(OWNER, vec![1.0, 1.0, 0.0, 0.0], None);
	let second = harness.add_item(OWNER, vec![1.0, 0.9, 0.1, 0.0], None);
	let (first_response, second_response) = tokio::join!(
		harness.service.predict(request(first)),
		async {
			// The first predict is parked in generation once its prompt is recorded.
			while harness.generator.calls().is_empty() {
				tokio::task::yield_now().await;
			}

			let response = harness.service.predict(request(second)).await;

			gate.notify_one();

			response
		}
	);

	assert_eq!(first_response.status, PredictStatus::Success, "response {first_response:?}");
	assert_eq!(second_response.status, PredictStatus::Success, "response {second_response:?}");
	assert!(first_response.recompute_scheduled);
	assert!(!second_response.recompute_scheduled);
	assert_eq!(harness.queue.drain(), vec![OWNER.to_string()]);
}

#[tokio::test]
async fn failed_similarity_query_reports_no_similar_items() {
	let harness = Harness::with_index_hook(IndexHook::FailQuery);

	seed_history(&harness).await;

	let target = harness.add_item(OWNER, vec![1.0, 1.0, 0.0, 0.0], None);
	let response = harness.service.predict(request(target)).await;

	assert_eq!(response.status, PredictStatus::NoSimilarItems);
	assert_eq!(response.state, PredictionState::NoSimilar);
	assert_eq!(response.validated_count, Some(5));
	assert!(response.neighbors.is_empty());
	assert!(harness.generator.calls().is_empty());

	let error = response.error.expect("query failure must be reported");

	assert_eq!(error.code, "index");
	assert!(error.retryable);
	assert!(harness.index.entry(target).is_some());
}
