use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceTier {
	/// Not enough validated history to attempt a prediction.
	Insufficient,
	Low,
	Normal,
}
impl ConfidenceTier {
	pub fn from_validated_count(validated_count: u64, min_labels: u32, normal_labels: u32) -> Self {
		if validated_count < u64::from(min_labels) {
			Self::Insufficient
		} else if validated_count < u64::from(normal_labels) {
			Self::Low
		} else {
			Self::Normal
		}
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Insufficient => "insufficient",
			Self::Low => "low",
			Self::Normal => "normal",
		}
	}
}
