use std::collections::HashMap;

use rand::{Rng, SeedableRng, rngs::StdRng};
use uuid::Uuid;

use lull_service::{
	PredictRequest, PredictStatus,
	stores::{SimilarityIndex, StatisticsStore},
};

use super::{Harness, SpyGenerator, label_reply, test_config};

const OWNERS: [&str; 3] = ["family-a", "family-b", "family-c"];
const ISOLATION_DIM: usize = 8;

fn random_vector(rng: &mut StdRng) -> Vec<f32> {
	(0..ISOLATION_DIM).map(|_| rng.gen_range(-2.0_f32..2.0)).collect()
}

#[tokio::test]
async fn owners_never_see_each_other() {
	let mut rng = StdRng::seed_from_u64(2024);
	let harness =
		Harness::with_config(test_config(ISOLATION_DIM), SpyGenerator::replying(label_reply("hungry")));
	let mut owned: HashMap<Uuid, &str> = HashMap::new();

	for owner in OWNERS {
		for _ in 0..8 {
			let item_id = harness.seed_labeled(owner, random_vector(&mut rng), "hungry").await;

			owned.insert(item_id, owner);
		}

		harness.recompute(owner).await;
	}

	for owner in OWNERS {
		let target = harness.add_item(owner, random_vector(&mut rng), None);
		let response = harness
			.service
			.predict(PredictRequest { item_id: target, owner_id: owner.to_string() })
			.await;

		assert_eq!(response.status, PredictStatus::Success, "owner {owner}");
		assert_eq!(response.validated_count, Some(8));

		for neighbor in &response.neighbors {
			assert_eq!(owned.get(&neighbor.item_id), Some(&owner), "owner {owner}");
		}

		let probe = random_vector(&mut rng);
		let hits = harness.index.query_knn(owner, &probe, 100, false).await.expect("query failed");

		assert_eq!(hits.len(), 9);
		assert!(hits.iter().all(|hit| hit.item_id == target || owned[&hit.item_id] == owner));
	}
}

#[tokio::test]
async fn recompute_for_one_owner_leaves_others_untouched() {
	let mut rng = StdRng::seed_from_u64(99);
	let harness = Harness::with_config(test_config(ISOLATION_DIM), SpyGenerator::unavailable());

	for owner in OWNERS {
		for _ in 0..5 {
			harness.seed_labeled(owner, random_vector(&mut rng), "tired").await;
		}

		harness.recompute(owner).await;
	}

	let before: Vec<_> = owner_statistics(&harness).await;

	harness.service.recompute_owner(OWNERS[0]).await.expect("recompute failed");

	let after: Vec<_> = owner_statistics(&harness).await;

	assert_eq!(after[0].generation, before[0].generation + 1);
	assert_eq!(after[0].mean, before[0].mean);
	assert_eq!(after[1..], before[1..]);
}

async fn owner_statistics(harness: &Harness) -> Vec<lull_service::stores::UserStatistics> {
	let mut out = Vec::with_capacity(OWNERS.len());

	for owner in OWNERS {
		out.push(
			harness
				.store
				.get_statistics(owner)
				.await
				.expect("get_statistics failed")
				.expect("statistics must exist"),
		);
	}

	out
}
