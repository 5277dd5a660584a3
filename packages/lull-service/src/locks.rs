use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async mutex per owner. Writes that must not interleave for an owner (storing a raw vector
/// and indexing it, recomputing, refreshing label metadata) run while holding its guard.
#[derive(Default)]
pub struct OwnerLocks {
	locks: DashMap<String, Arc<Mutex<()>>>,
}
impl OwnerLocks {
	pub fn new() -> Self {
		Self::default()
	}

	pub async fn lock(&self, owner_id: &str) -> OwnedMutexGuard<()> {
		// Clone out of the map first so the shard lock is not held across the await.
		let lock = self.locks.entry(owner_id.to_string()).or_default().clone();

		lock.lock_owned().await
	}
}
