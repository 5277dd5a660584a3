pub mod confidence;
pub mod standardize;
pub mod statistics;
pub mod trigger;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Vector dimension {actual} does not match expected dimension {expected}.")]
pub struct DimensionMismatch {
	pub expected: usize,
	pub actual: usize,
}
