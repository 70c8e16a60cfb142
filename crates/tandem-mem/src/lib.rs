#![forbid(unsafe_code)]
//! tandem-mem: memory budgeting and footprint estimation.
//!
//! This crate provides concrete implementations for the *interfaces* defined
//! in `tandem-core::budget`. Every cached in-memory result in the engine holds
//! a guard from here, so "available memory" is simply capacity minus the
//! footprint of what is cached.

pub mod error;
pub mod footprint;
pub mod guard;
pub mod tracking;

pub use footprint::{estimate_rows_bytes, row_width_bytes, scalar_bytes, table_bytes};
pub use guard::{BudgetGuardImpl, MemoryBudgetImpl};
pub use tracking::PeakTracker;
