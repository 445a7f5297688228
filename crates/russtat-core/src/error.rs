//! Error types for `russtat-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A release failed validation; the whole batch is rejected.
  #[error("invalid release {dataset:?}: {reason}")]
  Validation { dataset: String, reason: String },

  #[error("natural key for {0} must not be empty")]
  EmptyKey(crate::key::Dimension),

  #[error("release document error: {0}")]
  Json(#[from] serde_json::Error),
}

impl Error {
  pub(crate) fn validation(dataset: &str, reason: impl Into<String>) -> Self {
    Self::Validation { dataset: dataset.to_owned(), reason: reason.into() }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
