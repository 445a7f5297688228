//! SQLite backend for the Russtat statistics warehouse.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Every write is a single
//! `BEGIN IMMEDIATE` transaction; dimension rows converge through upserts
//! against their natural-key uniqueness constraints.

mod dataset;
mod encode;
mod hierarchy;
mod ingest;
mod observation;
mod resolve;
mod schema;
mod store;

pub mod config;
pub mod error;

pub use crate::config::WarehouseConfig;
pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
