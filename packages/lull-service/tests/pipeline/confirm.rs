use lull_service::{
	ConfirmLabelRequest, Error, PredictRequest, PredictStatus, stores::LabelUpdate,
};

use super::{Harness, OWNER, SpyGenerator, label_reply};

#[tokio::test]
async fn confirmation_marks_user_source_and_refreshes_index() {
	let harness = Harness::new(SpyGenerator::replying(label_reply("hungry")));
	let item_id = harness.add_item(OWNER, vec![1.0, 0.0, 0.5, 0.0], None);

	harness.service.predict(PredictRequest { item_id, owner_id: OWNER.to_string() }).await;

	assert!(!harness.index.entry(item_id).expect("entry must exist").label_present);

	let confirmed = harness
		.service
		.confirm_label(ConfirmLabelRequest {
			item_id,
			owner_id: OWNER.to_string(),
			label: Some("  hungry ".to_string()),
			resolution: Some("Fed 90 ml.".to_string()),
			notes: Some("Calmed in five minutes.".to_string()),
			validated: Some(true),
		})
		.await
		.expect("confirm failed");

	assert_eq!(confirmed.label.as_deref(), Some("hungry"));
	assert_eq!(confirmed.label_source.as_deref(), Some("user"));
	assert_eq!(confirmed.resolution_source.as_deref(), Some("user"));
	assert!(confirmed.label_present());
	assert!(harness.index.entry(item_id).expect("entry must exist").label_present);

	let rejected = harness
		.service
		.confirm_label(ConfirmLabelRequest {
			item_id,
			owner_id: OWNER.to_string(),
			validated: Some(false),
			..Default::default()
		})
		.await
		.expect("confirm failed");

	assert_eq!(rejected.label.as_deref(), Some("hungry"));
	assert!(!rejected.label_present());
	assert!(!harness.index.entry(item_id).expect("entry must exist").label_present);
}

#[tokio::test]
async fn confirming_an_unindexed_item_only_updates_labels() {
	let harness = Harness::new(SpyGenerator::unavailable());
	let item_id = harness.add_item(OWNER, vec![1.0, 0.0, 0.0, 0.0], None);
	let confirmed = harness
		.service
		.confirm_label(ConfirmLabelRequest {
			item_id,
			owner_id: OWNER.to_string(),
			label: Some("tired".to_string()),
			validated: Some(true),
			..Default::default()
		})
		.await
		.expect("confirm failed");

	assert!(confirmed.label_present());
	assert!(harness.index.is_empty());
}

#[tokio::test]
async fn confirmation_for_another_owner_is_not_found() {
	let harness = Harness::new(SpyGenerator::unavailable());
	let item_id = harness.add_item(OWNER, vec![1.0, 0.0, 0.0, 0.0], None);
	let err = harness
		.service
		.confirm_label(ConfirmLabelRequest {
			item_id,
			owner_id: "family-b".to_string(),
			label: Some("tired".to_string()),
			validated: Some(true),
			..Default::default()
		})
		.await
		.expect_err("confirm must fail");

	assert!(matches!(err, Error::NotFound { .. }), "error {err:?}");
	assert_eq!(harness.item(item_id).await.label, None);
}

#[tokio::test]
async fn overlong_notes_are_rejected() {
	let harness = Harness::new(SpyGenerator::unavailable());
	let item_id = harness.add_item(OWNER, vec![1.0, 0.0, 0.0, 0.0], None);
	let err = harness
		.service
		.confirm_label(ConfirmLabelRequest {
			item_id,
			owner_id: OWNER.to_string(),
			notes: Some("n".repeat(501)),
			..Default::default()
		})
		.await
		.expect_err("confirm must fail");

	assert!(matches!(err, Error::Validation { .. }), "error {err:?}");
	assert_eq!(harness.item(item_id).await.notes, None);
}

#[tokio::test]
async fn confirmed_items_become_prediction_history() {
	let harness = Harness::new(SpyGenerator::replying(label_reply("hungry")));
	let mut items = Vec::new();

	for offset in 0..5 {
		let item_id = harness.add_item(OWNER, vec![1.0, offset as f32 * 0.1, 0.0, 0.2], None);
		let response =
			harness.service.predict(PredictRequest { item_id, owner_id: OWNER.to_string() }).await;

		assert_eq!(response.status, PredictStatus::NeedsManualLabeling);

		items.push(item_id);
	}

	for item_id in &items {
		harness
			.service
			.confirm_label(ConfirmLabelRequest {
				item_id: *item_id,
				owner_id: OWNER.to_string(),
				label: Some("hungry".to_string()),
				resolution: Some("Fed.".to_string()),
				validated: Some(true),
				..Default::default()
			})
			.await
			.expect("confirm failed");
	}

	let target = harness.add_item(OWNER, vec![1.0, 0.25, 0.0, 0.2], None);
	let response =
		harness.service.predict(PredictRequest { item_id: target, owner_id: OWNER.to_string() }).await;

	assert_eq!(response.status, PredictStatus::Success, "response {response:?}");
	assert_eq!(response.validated_count, Some(5));
	assert_eq!(response.neighbors.len(), 3);
	assert!(response.neighbors.iter().all(|neighbor| items.contains(&neighbor.item_id)));
}

#[tokio::test]
async fn index_flag_follows_the_latest_confirmation() {
	let harness = Harness::with_racing_confirmation(LabelUpdate {
		validated: Some(false),
		..Default::default()
	});
	let item_id = harness.add_item(OWNER, vec![0.0, 1.0, 0.0, 0.5], None);

	harness.service.predict(PredictRequest { item_id, owner_id: OWNER.to_string() }).await;

	let confirmed = harness
		.service
		.confirm_label(ConfirmLabelRequest {
			item_id,
			owner_id: OWNER.to_string(),
			label: Some("hungry".to_string()),
			validated: Some(true),
			..Default::default()
		})
		.await
		.expect("confirm failed");

	assert_eq!(confirmed.validated, Some(false));
	assert!(!confirmed.label_present());
	assert_eq!(harness.item(item_id).await.validated, Some(false));
	assert!(!harness.index.entry(item_id).expect("entry must exist").label_present);
}
