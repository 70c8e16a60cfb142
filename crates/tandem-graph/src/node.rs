//! Node and operation definitions.

use std::fmt;
use std::sync::Arc;

use tandem_core::config::Backend;
use tandem_core::id::NodeId;
use tandem_core::ops::{AggFunc, ArithOp, BoolOp, CompareOp, JoinType, UnaryOp};
use tandem_core::schema::{JoinLayout, Schema};
use tandem_core::types::{Scalar, Table};

/// User-supplied table function evaluated by the in-memory engine only.
pub type TableFn = Arc<dyn Fn(&Table) -> tandem_core::error::Result<Table> + Send + Sync>;

/// Predicate forms. Operands are the node's `eval_sources`.
#[derive(Debug, Clone, PartialEq)]
pub enum Criterion {
    /// `lhs op rhs`
    Compare(CompareOp),
    /// `operand LIKE pattern`
    Like(String),
    /// `operand IS NULL`
    IsNull,
    /// `lhs AND rhs`, `lhs OR rhs`, `NOT operand`
    Logical(BoolOp),
}

/// Element-wise arithmetic. Operands are the node's `eval_sources`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Arithmetic {
    Binary(ArithOp),
    Unary(UnaryOp),
}

/// Operations with no SQL translation.
#[derive(Clone)]
pub enum FallbackOp {
    /// Summary statistics of every column.
    Describe,
    /// Arbitrary table function with a declared output schema.
    Apply { name: String, func: TableFn },
}

impl fmt::Debug for FallbackOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackOp::Describe => write!(f, "Describe"),
            FallbackOp::Apply { name, .. } => f.debug_struct("Apply").field("name", name).finish(),
        }
    }
}

/// The closed set of operations.
#[derive(Debug, Clone)]
pub enum Op {
    /// Base table; its data is handed to the engine at construction.
    Source,
    Constant(Scalar),
    Criterion(Criterion),
    Arithmetic(Arithmetic),
    Projection {
        columns: Vec<String>,
        distinct: bool,
    },
    /// Rows of `sources[0]` where `eval_sources[0]` holds.
    Selection,
    Join {
        left_on: Vec<String>,
        right_on: Vec<String>,
        how: JoinType,
        layout: JoinLayout,
    },
    Union,
    OrderBy {
        keys: Vec<(String, bool)>,
    },
    Limit {
        n: usize,
    },
    /// Container: grouping keys over `sources[0]`.
    GroupBy {
        keys: Vec<String>,
    },
    /// Container: column subset of a `GroupBy`.
    GroupByProjection {
        columns: Vec<String>,
    },
    /// Aggregation of `columns` of `input`, per group of `keys` when non-empty.
    Aggregator {
        func: AggFunc,
        input: NodeId,
        keys: Vec<String>,
        columns: Vec<String>,
    },
    Rename {
        mapping: Vec<(String, String)>,
    },
    /// `sources[0]` with `column` replaced (or appended) by `eval_sources[0]`.
    Assign {
        column: String,
    },
    Fallback(FallbackOp),
}

impl Op {
    pub fn kind(&self) -> &'static str {
        match self {
            Op::Source => "source",
            Op::Constant(_) => "constant",
            Op::Criterion(_) => "criterion",
            Op::Arithmetic(_) => "arithmetic",
            Op::Projection { .. } => "projection",
            Op::Selection => "selection",
            Op::Join { .. } => "join",
            Op::Union => "union",
            Op::OrderBy { .. } => "order_by",
            Op::Limit { .. } => "limit",
            Op::GroupBy { .. } => "group_by",
            Op::GroupByProjection { .. } => "group_by_projection",
            Op::Aggregator { .. } => "aggregator",
            Op::Rename { .. } => "rename",
            Op::Assign { .. } => "assign",
            Op::Fallback(_) => "fallback",
        }
    }

    /// Whether the compiler can render this node as a query.
    pub fn has_sql(&self) -> bool {
        !matches!(
            self,
            Op::Source | Op::Fallback(_) | Op::GroupBy { .. } | Op::GroupByProjection { .. }
        )
    }

    /// Grouping metadata only; never materialized.
    pub fn is_container(&self) -> bool {
        matches!(self, Op::GroupBy { .. } | Op::GroupByProjection { .. })
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Op::Fallback(_))
    }

    /// Usable as a criterion / arithmetic operand.
    pub fn is_expression(&self) -> bool {
        matches!(self, Op::Constant(_) | Op::Criterion(_) | Op::Arithmetic(_))
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    /// Table / CTE name on the relational engine.
    pub name: String,
    pub op: Op,
    /// Inputs for both backends, in declaration order.
    pub sources: Vec<NodeId>,
    /// Extra inputs needed only by the in-memory engine.
    pub eval_sources: Vec<NodeId>,
    pub schema: Schema,
}

impl Node {
    pub fn columns(&self) -> Vec<String> {
        self.schema.names()
    }

    /// Edges followed when resolving dependencies for `backend`.
    pub fn deps(&self, backend: Backend) -> impl Iterator<Item = NodeId> + '_ {
        let eval: &[NodeId] = match backend {
            Backend::InMemory => &self.eval_sources,
            Backend::Relational => &[],
        };
        self.sources.iter().chain(eval.iter()).copied()
    }
}
