#![forbid(unsafe_code)]
//! tandem-store: the relational backend.
//!
//! One `RelationalStore` owns one SQLite connection at a time. It knows how to
//! create a table from a compiled query, bulk load an in-memory table, read a
//! table back in insertion order, and report sizes. Replacing the database
//! file bumps the store's `Generation`, which is how the engine tells whether
//! a relational cache marker still refers to a live table.
//!
//! The `readers` module turns CSV / JSON files into `Table`s for ingestion.

pub mod convert;
pub mod error;
pub mod functions;
pub mod readers;
pub mod store;

pub use error::{Result, StoreError};
pub use store::{RelationalStore, StoreStats};
