//! Error types for `genobase-core`.
//!
//! Every operation returns its own error value; there is no shared
//! "last error" slot, so concurrent sessions cannot clobber each other's
//! failure reports.

use thiserror::Error;

use crate::{genome::GenomeId, list::ListId, user::UserId};

#[derive(Debug, Error)]
pub enum Error {
  #[error("user not found: {0}")]
  UserNotFound(String),

  #[error("user id not found: {0}")]
  UserIdNotFound(UserId),

  #[error("incorrect password")]
  BadCredential,

  #[error("username already taken: {0:?}")]
  UsernameTaken(String),

  #[error("genome not found: {0}")]
  GenomeNotFound(GenomeId),

  #[error("genome list not found: {0}")]
  ListNotFound(ListId),

  #[error("genome source not found: {0:?}")]
  SourceNotFound(String),

  /// The (source, id_at_source) pair is already registered.
  #[error("accession {id_at_source:?} already registered under this source")]
  AccessionTaken { id_at_source: String },

  #[error("metadata path not found: {0}")]
  MetadataPathNotFound(String),

  #[error("insufficient privilege: {0}")]
  InsufficientPrivilege(&'static str),

  #[error("invalid argument: {0}")]
  InvalidArgument(String),

  #[error("malformed tree identifier: {0:?}")]
  BadTreeId(String),

  #[error("malformed metadata document: {0}")]
  MalformedDocument(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
