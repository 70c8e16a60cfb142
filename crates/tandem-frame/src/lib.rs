#![forbid(unsafe_code)]
//! tandem-frame: the in-memory table engine.
//!
//! Design intent:
//! - Pure and synchronous; operates on `tandem_core::types::Table`.
//! - Results follow the same semantics as the SQL the compiler emits
//!   (null propagation, truncating remainder, float division, grouped output
//!   sorted by key) so either backend can serve any node.
//! - Memory accounting is the caller's job; `Value::footprint` reports the
//!   bytes a cached result holds.

pub mod aggregate;
pub mod describe;
pub mod error;
pub mod filter;
pub mod join;
pub mod kernels;
pub mod project;
pub mod sort;
pub mod value;

pub use error::{FrameError, Result};
pub use value::Value;
