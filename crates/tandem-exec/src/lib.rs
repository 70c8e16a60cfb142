#![forbid(unsafe_code)]
//! tandem-exec: deciding where each node runs, and running it there.
//!
//! - `policy` + `cost`: pick a backend per node (ALWAYS / NEVER / BEST).
//! - `engine`: per-node state machine, dependency materialization, the
//!   relational path (render, create, read back) and the out-of-memory guard.
//! - `eval`: in-memory evaluation of a single node over cached inputs.
//! - `session`: the user-facing `Session` / `DataFrame` / `GroupBy` handles.

pub mod cost;
pub mod engine;
pub mod error;
pub mod eval;
pub mod metrics;
pub mod policy;
pub mod session;

pub use cost::{CostContext, CostModel, DefaultCostModel, Statistics};
pub use engine::Engine;
pub use error::{ExecError, Result};
pub use session::{DataFrame, GroupBy, Operand, Session};
