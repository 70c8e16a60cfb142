#![forbid(unsafe_code)]
//! tandem-graph: the lazy computation graph.
//!
//! Nodes live in an append-only arena (`Graph`) and are addressed by
//! `NodeId`. A node's sources always precede it in the arena and never change
//! after construction, so the graph is acyclic by construction; the resolver
//! still checks for cycles.
//!
//! Responsibilities:
//! - validate and type every operation at construction time;
//! - keep the non-owning dependents index;
//! - order unmaterialized ancestors per backend and prove computability
//!   before any backend work starts.

pub mod graph;
pub mod node;
pub mod resolve;
pub mod verify;

pub use graph::Graph;
pub use node::{Arithmetic, Criterion, FallbackOp, Node, Op, TableFn};
pub use resolve::{computability_check, dependency_order, MaterializationView};
