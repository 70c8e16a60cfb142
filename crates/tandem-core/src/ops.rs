//! Operator vocabulary shared by the graph, the SQL compiler and the
//! in-memory engine.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::schema::DataType;

/// Binary comparison of two operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn sql(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

/// Compound criterion connective. `Not` is unary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoolOp {
    And,
    Or,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    /// True division; always produces a float.
    Div,
    /// Remainder truncated toward zero.
    Rem,
    BitAnd,
    BitOr,
    BitXor,
}

impl ArithOp {
    pub fn sql(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
            ArithOp::Rem => "%",
            ArithOp::BitAnd => "&",
            ArithOp::BitOr => "|",
            // SQLite has no XOR operator; the compiler expands it.
            ArithOp::BitXor => "^",
        }
    }

    pub fn is_bitwise(self) -> bool {
        matches!(self, ArithOp::BitAnd | ArithOp::BitOr | ArithOp::BitXor)
    }

    /// Output type for operands of type `l` and `r`.
    pub fn result_type(self, l: DataType, r: DataType) -> DataType {
        match self {
            ArithOp::Div => DataType::Float64,
            op if op.is_bitwise() => DataType::Int64,
            _ => match l.promote(r) {
                DataType::Boolean | DataType::Null => DataType::Int64,
                t => t,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    BitNot,
}

/// Aggregation function over a column (or per group).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggFunc {
    Sum,
    Count,
    Mean,
    Min,
    Max,
    Prod,
    Any,
    All,
}

impl AggFunc {
    pub fn name(self) -> &'static str {
        match self {
            AggFunc::Sum => "sum",
            AggFunc::Count => "count",
            AggFunc::Mean => "mean",
            AggFunc::Min => "min",
            AggFunc::Max => "max",
            AggFunc::Prod => "prod",
            AggFunc::Any => "any",
            AggFunc::All => "all",
        }
    }

    /// Whether the input column must be numeric.
    pub fn requires_numeric(self) -> bool {
        matches!(self, AggFunc::Sum | AggFunc::Mean | AggFunc::Prod)
    }

    pub fn result_type(self, input: DataType) -> DataType {
        match self {
            AggFunc::Count => DataType::Int64,
            AggFunc::Mean => DataType::Float64,
            AggFunc::Any | AggFunc::All => DataType::Boolean,
            AggFunc::Min | AggFunc::Max => input,
            AggFunc::Sum | AggFunc::Prod => match input {
                DataType::Float64 => DataType::Float64,
                _ => DataType::Int64,
            },
        }
    }
}

impl fmt::Display for AggFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinType {
    Inner,
    Left,
}
