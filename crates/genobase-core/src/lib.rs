//! Core types and trait definitions for the genobase genome repository.
//!
//! This crate is deliberately free of database dependencies. The storage
//! backend (`genobase-store-sqlite`) and the command-line front end depend
//! on it; it depends on nothing proprietary.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod auth;
pub mod error;
pub mod genome;
pub mod list;
pub mod metadata;
pub mod store;
pub mod user;

pub use error::{Error, Result};
