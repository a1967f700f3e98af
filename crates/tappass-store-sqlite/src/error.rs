//! Error type for `tappass-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] tappass_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored column holds a value no decoder accepts.
  #[error("corrupt {column} value: {value:?}")]
  Corrupt { column: &'static str, value: String },

  #[error("digital id {0} is already registered")]
  DuplicateDigitalId(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
