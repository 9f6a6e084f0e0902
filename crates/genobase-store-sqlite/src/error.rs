//! Error type for `genobase-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A domain rule rejected the operation (privilege, uniqueness, lookup
  /// miss, malformed argument). See [`genobase_core::Error`].
  #[error(transparent)]
  Core(#[from] genobase_core::Error),

  /// The underlying store failed or is unreachable.
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),
}

impl Error {
  /// Convenience for tests and callers matching on the domain kind.
  pub fn as_core(&self) -> Option<&genobase_core::Error> {
    match self {
      Error::Core(e) => Some(e),
      Error::Database(_) => None,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
