//! Error type for `russtat-store-sqlite`.

use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] russtat_core::Error),

  /// A uniqueness or foreign-key conflict the upsert path did not absorb.
  #[error("constraint violation: {0}")]
  ConstraintViolation(String),

  #[error("database error: {0}")]
  Database(tokio_rusqlite::Error),

  #[error("configuration error: {0}")]
  Config(#[from] config::ConfigError),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("unknown classifier parent state: {0:?}")]
  UnknownParentState(String),
}

impl From<tokio_rusqlite::Error> for Error {
  fn from(err: tokio_rusqlite::Error) -> Self {
    if let tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(code, message)) = &err
      && code.code == ErrorCode::ConstraintViolation
    {
      return Self::ConstraintViolation(message.clone().unwrap_or_else(|| code.to_string()));
    }
    Self::Database(err)
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
