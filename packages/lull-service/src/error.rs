use lull_domain::{DimensionMismatch, statistics::StatisticsError};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Validation failed: {message}")]
	Validation { message: String },
	#[error("Not found: {message}")]
	NotFound { message: String },
	#[error("Feature extraction failed: {message}")]
	Extraction { message: String },
	#[error("Similarity index error: {message}")]
	Index { message: String },
	#[error("Generation failed: {message}")]
	Generation { message: String },
	#[error("Persistence error: {message}")]
	Persistence { message: String },
	#[error("Cannot compute statistics from an empty vector set.")]
	EmptyInput,
	#[error("Statistics for owner {owner_id} were removed.")]
	OwnerRemoved { owner_id: String },
	#[error("Statistics for owner {owner_id} moved from generation {expected} to {found}.")]
	Superseded { owner_id: String, expected: i64, found: i64 },
}
impl Error {
	pub fn code(&self) -> &'static str {
		match self {
			Self::Validation { .. } => "validation",
			Self::NotFound { .. } => "not_found",
			Self::Extraction { .. } => "extraction",
			Self::Index { .. } => "index",
			Self::Generation { .. } => "generation",
			Self::Persistence { .. } => "persistence",
			Self::EmptyInput => "empty_input",
			Self::OwnerRemoved { .. } => "owner_removed",
			Self::Superseded { .. } => "superseded",
		}
	}

	/// Whether running the same job again may succeed.
	pub fn is_retryable(&self) -> bool {
		matches!(
			self,
			Self::Extraction { .. }
				| Self::Index { .. }
				| Self::Generation { .. }
				| Self::Persistence { .. }
				| Self::Superseded { .. }
		)
	}

	pub(crate) fn validation(message: impl Into<String>) -> Self {
		Self::Validation { message: message.into() }
	}

	pub(crate) fn index(err: impl std::fmt::Display) -> Self {
		Self::Index { message: err.to_string() }
	}
}
impl From<lull_storage::Error> for Error {
	fn from(err: lull_storage::Error) -> Self {
		match err {
			lull_storage::Error::Sqlx(inner) => Self::Persistence { message: inner.to_string() },
			lull_storage::Error::InvalidArgument(message) => Self::Validation { message },
			lull_storage::Error::NotFound(message) => Self::NotFound { message },
			lull_storage::Error::MalformedVector(message) => Self::Persistence { message },
			lull_storage::Error::Qdrant(inner) => Self::Index { message: inner.to_string() },
		}
	}
}
impl From<lull_providers::Error> for Error {
	fn from(err: lull_providers::Error) -> Self {
		match err {
			lull_providers::Error::NotFound { message } => Self::NotFound { message },
			other => Self::Extraction { message: other.to_string() },
		}
	}
}
impl From<StatisticsError> for Error {
	fn from(err: StatisticsError) -> Self {
		match err {
			StatisticsError::EmptyInput => Self::EmptyInput,
			StatisticsError::Dimension { index, source } =>
				Self::validation(format!("Vector {index}: {source}")),
		}
	}
}
impl From<DimensionMismatch> for Error {
	fn from(err: DimensionMismatch) -> Self {
		Self::validation(err.to_string())
	}
}
