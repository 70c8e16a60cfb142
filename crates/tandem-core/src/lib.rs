#![forbid(unsafe_code)]
//! tandem-core: shared kernel for the tandem engine.
//!
//! This crate contains only *pure* types, small helpers, and interfaces
//! (traits) that other crates implement. There is **no I/O** and no backend
//! access here.
//!
//! Crates that use this:
//! - tandem-mem: implements the MemoryBudget trait (guards + footprints).
//! - tandem-frame: the in-memory engine operating on `Table`s.
//! - tandem-store: the SQLite adapter converting `Scalar`s to SQL values.
//! - tandem-graph: the node arena, typed by `Schema` and addressed by `NodeId`.
//! - tandem-sql / tandem-exec: compile and run nodes against both backends.

pub mod budget;
pub mod config;
pub mod error;
pub mod id;
pub mod ops;
pub mod prelude;
pub mod schema;
pub mod types;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
