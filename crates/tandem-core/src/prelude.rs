//! Convenient re-exports for downstream crates.

pub use crate::config::{Backend, CostWeights, EngineConfig, OffloadStrategy};
pub use crate::error::{Error, Result};
pub use crate::id::{Generation, NodeId};
pub use crate::ops::{AggFunc, ArithOp, BoolOp, CompareOp, JoinType, UnaryOp};
pub use crate::schema::{DataType, Field, JoinLayout, Schema};
pub use crate::types::{Column, Scalar, Table};
