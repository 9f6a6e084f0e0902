//! SQLite backend for the genobase genome repository.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated
//! thread without blocking the async runtime. The single connection also
//! serializes the store's read-modify-write sequences (tree-identifier
//! allocation, whole-document metadata updates), which are not safe under
//! concurrent invocation against the same prefix or genome.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
