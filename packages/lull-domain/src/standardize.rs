use crate::DimensionMismatch;

pub const DEFAULT_EPSILON: f64 = 1e-8;

/// Z-scores `vector` against per-dimension `mean` and `std`.
///
/// Each element becomes `(v - mean) / (std + epsilon)`, evaluated in f64 and narrowed to f32.
/// `epsilon` keeps zero-variance dimensions finite, and results outside the f32 range saturate
/// at `f32::MIN` / `f32::MAX`.
pub fn standardize(
	vector: &[f32],
	mean: &[f32],
	std: &[f32],
	epsilon: f64,
) -> Result<Vec<f32>, DimensionMismatch> {
	for stats_len in [mean.len(), std.len()] {
		if stats_len != vector.len() {
			return Err(DimensionMismatch { expected: stats_len, actual: vector.len() });
		}
	}

	let out = vector
		.iter()
		.zip(mean.iter().zip(std.iter()))
		.map(|(value, (mean, std))| {
			let z = (f64::from(*value) - f64::from(*mean)) / (f64::from(*std) + epsilon);

			z.clamp(f64::from(f32::MIN), f64::from(f32::MAX)) as f32
		})
		.collect();

	Ok(out)
}
