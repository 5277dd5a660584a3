/// Decides when an owner's statistics are due for a full recompute.
///
/// The counter is the number of items that carry a raw embedding. A recompute fires when that
/// count is a positive multiple of `interval` and has moved past the sample count the current
/// statistics were built from, so each multiple fires exactly once even if the check is
/// repeated at the same count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecomputeTrigger {
	interval: u64,
}
impl RecomputeTrigger {
	pub fn new(interval: u32) -> Self {
		Self { interval: u64::from(interval.max(1)) }
	}

	pub fn interval(&self) -> u64 {
		self.interval
	}

	pub fn fires(&self, embedded_count: u64, last_sample_count: u64) -> bool {
		embedded_count > 0
			&& embedded_count % self.interval == 0
			&& embedded_count > last_sample_count
	}
}
