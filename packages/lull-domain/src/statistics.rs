use crate::DimensionMismatch;

/// Per-dimension mean and population standard deviation of an owner's raw vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorStatistics {
	pub mean: Vec<f32>,
	pub std: Vec<f32>,
	pub sample_count: usize,
}
impl VectorStatistics {
	/// Statistics that make standardization a no-op, used before any recompute has run.
	pub fn identity(dim: usize) -> Self {
		Self { mean: vec![0.0; dim], std: vec![1.0; dim], sample_count: 0 }
	}

	pub fn dim(&self) -> usize {
		self.mean.len()
	}
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StatisticsError {
	#[error("Cannot compute statistics from an empty vector set.")]
	EmptyInput,
	#[error("Vector at position {index} is invalid: {source}")]
	Dimension { index: usize, source: DimensionMismatch },
}

/// Computes mean and ddof=0 standard deviation across `vectors`.
///
/// The first vector fixes the dimension. Accumulation runs in f64 with a two-pass variance so
/// large offsets do not cancel out the spread.
pub fn compute<V>(vectors: &[V]) -> Result<VectorStatistics, StatisticsError>
where
	V: AsRef<[f32]>,
{
	let Some(first) = vectors.first() else {
		return Err(StatisticsError::EmptyInput);
	};
	let dim = first.as_ref().len();

	for (index, vector) in vectors.iter().enumerate() {
		let actual = vector.as_ref().len();

		if actual != dim {
			return Err(StatisticsError::Dimension {
				index,
				source: DimensionMismatch { expected: dim, actual },
			});
		}
	}

	let n = vectors.len() as f64;
	let mut sums = vec![0.0_f64; dim];

	for vector in vectors {
		for (sum, value) in sums.iter_mut().zip(vector.as_ref()) {
			*sum += f64::from(*value);
		}
	}

	let means: Vec<f64> = sums.into_iter().map(|sum| sum / n).collect();
	let mut squares = vec![0.0_f64; dim];

	for vector in vectors {
		for ((square, value), mean) in squares.iter_mut().zip(vector.as_ref()).zip(&means) {
			let delta = f64::from(*value) - mean;

			*square += delta * delta;
		}
	}

	let std = squares.into_iter().map(|square| (square / n).sqrt() as f32).collect();
	let mean = means.into_iter().map(|mean| mean as f32).collect();

	Ok(VectorStatistics { mean, std, sample_count: vectors.len() })
}
