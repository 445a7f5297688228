//! Core types and trait definitions for the Russtat statistics warehouse.
//!
//! This crate is deliberately free of database dependencies. It owns the
//! release document model, its validation into batch input, natural keys and
//! the [`Warehouse`](store::Warehouse) abstraction that storage backends
//! implement.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod classifier;
pub mod error;
pub mod key;
pub mod release;
pub mod store;
pub mod timestamp;

pub use error::{Error, Result};
