//! Per-node query rendering.
//!
//! `render_fragment` produces one node's own `SELECT` over its sources by
//! name. `render` prefixes it with a `WITH` clause defining every ancestor
//! that has no table on the relational engine yet, so the statement is
//! self-contained. Columns are always qualified with the owning node's name.

use tandem_core::config::Backend;
use tandem_core::error::{Error, Result};
use tandem_core::id::NodeId;
use tandem_core::ops::{AggFunc, ArithOp, BoolOp, JoinType, UnaryOp};
use tandem_core::types::Scalar;
use tandem_graph::graph::Graph;
use tandem_graph::node::{Arithmetic, Criterion, Node, Op};
use tandem_graph::resolve::{dependency_order, MaterializationView};

use crate::quote::{ident, literal, qualified};

/// Full statement for `node`, with unmaterialized ancestors as CTEs.
pub fn render(graph: &Graph, node: NodeId, view: &dyn MaterializationView) -> Result<String> {
    let mut ctes = Vec::new();
    for dep in dependency_order(graph, node, Backend::Relational, view)? {
        let dep_node = graph.node(dep)?;
        if dep_node.op.is_container() || view.relational(dep) {
            continue;
        }
        if !dep_node.op.has_sql() {
            return Err(Error::Invariant(format!(
                "{} ({}) must be loaded before rendering",
                dep_node.name,
                dep_node.op.kind()
            )));
        }
        ctes.push(format!(
            "{} AS ({})",
            ident(&dep_node.name),
            render_fragment(graph, dep)?
        ));
    }

    let body = render_fragment(graph, node)?;
    if ctes.is_empty() {
        Ok(body)
    } else {
        Ok(format!("WITH {} {}", ctes.join(", "), body))
    }
}

fn source<'a>(graph: &'a Graph, node: &Node, idx: usize) -> Result<&'a Node> {
    let id = node.sources.get(idx).ok_or_else(|| {
        Error::Invariant(format!("{} is missing source #{}", node.name, idx))
    })?;
    graph.node(*id)
}

fn select_list(table: &str, columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| qualified(table, c))
        .collect::<Vec<_>>()
        .join(", ")
}

/// The node's own query, referencing its sources by name.
pub fn render_fragment(graph: &Graph, id: NodeId) -> Result<String> {
    let node = graph.node(id)?;
    let out_column = |idx: usize| -> Result<&str> {
        node.schema
            .field(idx)
            .map(|f| f.name.as_str())
            .ok_or_else(|| Error::Invariant(format!("{} has no column #{}", node.name, idx)))
    };

    Ok(match &node.op {
        Op::Source | Op::Fallback(_) | Op::GroupBy { .. } | Op::GroupByProjection { .. } => {
            return Err(Error::Invariant(format!(
                "{} ({}) has no SQL form",
                node.name,
                node.op.kind()
            )))
        }

        Op::Constant(v) => format!("SELECT {} AS {}", literal(v), ident(out_column(0)?)),

        Op::Criterion(_) | Op::Arithmetic(_) => {
            let base = source(graph, node, 0)?;
            format!(
                "SELECT {} AS {} FROM {}",
                expression(graph, id)?,
                ident(out_column(0)?),
                ident(&base.name)
            )
        }

        Op::Projection { columns, distinct } => {
            let src = source(graph, node, 0)?;
            format!(
                "SELECT {}{} FROM {}",
                if *distinct { "DISTINCT " } else { "" },
                select_list(&src.name, columns),
                ident(&src.name)
            )
        }

        Op::Selection => {
            let src = source(graph, node, 0)?;
            let criterion = node.eval_sources.first().ok_or_else(|| {
                Error::Invariant(format!("{} has no criterion", node.name))
            })?;
            format!(
                "SELECT {} FROM {} WHERE {}",
                select_list(&src.name, &src.columns()),
                ident(&src.name),
                expression(graph, *criterion)?
            )
        }

        Op::Join {
            left_on,
            right_on,
            how,
            layout,
        } => {
            let left = source(graph, node, 0)?;
            let right = source(graph, node, 1)?;
            // A self-join needs a distinct alias for the right side.
            let right_alias = if left.id == right.id {
                format!("{}_rhs", right.name)
            } else {
                right.name.clone()
            };
            let cols: Vec<String> = layout
                .left
                .iter()
                .map(|(c, out)| format!("{} AS {}", qualified(&left.name, c), ident(out)))
                .chain(
                    layout
                        .right
                        .iter()
                        .map(|(c, out)| format!("{} AS {}", qualified(&right_alias, c), ident(out))),
                )
                .collect();
            let on: Vec<String> = left_on
                .iter()
                .zip(right_on)
                .map(|(l, r)| format!("{} = {}", qualified(&left.name, l), qualified(&right_alias, r)))
                .collect();
            let kind = match how {
                JoinType::Inner => "INNER JOIN",
                JoinType::Left => "LEFT JOIN",
            };
            let right_ref = if right_alias == right.name {
                ident(&right.name)
            } else {
                format!("{} AS {}", ident(&right.name), ident(&right_alias))
            };
            format!(
                "SELECT {} FROM {} {} {} ON {}",
                cols.join(", "),
                ident(&left.name),
                kind,
                right_ref,
                on.join(" AND ")
            )
        }

        Op::Union => {
            let columns = node.columns();
            let parts = node
                .sources
                .iter()
                .map(|s| {
                    let src = graph.node(*s)?;
                    Ok(format!(
                        "SELECT {} FROM {}",
                        select_list(&src.name, &columns),
                        ident(&src.name)
                    ))
                })
                .collect::<Result<Vec<_>>>()?;
            parts.join(" UNION ALL ")
        }

        Op::OrderBy { keys } => {
            let src = source(graph, node, 0)?;
            let order: Vec<String> = keys
                .iter()
                .map(|(k, asc)| {
                    format!(
                        "{} {}",
                        qualified(&src.name, k),
                        if *asc { "ASC" } else { "DESC" }
                    )
                })
                .collect();
            format!(
                "SELECT {} FROM {} ORDER BY {}",
                select_list(&src.name, &src.columns()),
                ident(&src.name),
                order.join(", ")
            )
        }

        Op::Limit { n } => {
            let src = source(graph, node, 0)?;
            format!(
                "SELECT {} FROM {} LIMIT {}",
                select_list(&src.name, &src.columns()),
                ident(&src.name),
                n
            )
        }

        Op::Aggregator {
            func,
            input,
            keys,
            columns,
        } => {
            let input = graph.node(*input)?;
            let mut select: Vec<String> = keys.iter().map(|k| qualified(&input.name, k)).collect();
            for c in columns {
                select.push(format!(
                    "{} AS {}",
                    aggregate(*func, &qualified(&input.name, c)),
                    ident(c)
                ));
            }
            let mut sql = format!("SELECT {} FROM {}", select.join(", "), ident(&input.name));
            if !keys.is_empty() {
                let keys = select_list(&input.name, keys);
                sql.push_str(&format!(" GROUP BY {} ORDER BY {}", keys, keys));
            }
            sql
        }

        Op::Rename { mapping } => {
            let src = source(graph, node, 0)?;
            let cols: Vec<String> = src
                .columns()
                .iter()
                .map(|c| match mapping.iter().find(|(from, _)| from == c) {
                    Some((_, to)) => format!("{} AS {}", qualified(&src.name, c), ident(to)),
                    None => qualified(&src.name, c),
                })
                .collect();
            format!("SELECT {} FROM {}", cols.join(", "), ident(&src.name))
        }

        Op::Assign { column } => {
            let src = source(graph, node, 0)?;
            let value = node.eval_sources.first().ok_or_else(|| {
                Error::Invariant(format!("{} has no assigned value", node.name))
            })?;
            let value_sql = format!("{} AS {}", expression(graph, *value)?, ident(column));
            let mut cols: Vec<String> = Vec::with_capacity(node.schema.len());
            let mut replaced = false;
            for c in src.columns() {
                if c == *column {
                    cols.push(value_sql.clone());
                    replaced = true;
                } else {
                    cols.push(qualified(&src.name, &c));
                }
            }
            if !replaced {
                cols.push(value_sql);
            }
            format!("SELECT {} FROM {}", cols.join(", "), ident(&src.name))
        }
    })
}

/// SQL for an aggregate over `arg`. Empty-input results match the in-memory
/// engine (`0` for sum, `false` for any, `true` for all).
fn aggregate(func: AggFunc, arg: &str) -> String {
    match func {
        AggFunc::Sum => format!("COALESCE(SUM({arg}), 0)"),
        AggFunc::Count => format!("COUNT({arg})"),
        AggFunc::Mean => format!("AVG({arg})"),
        AggFunc::Min => format!("MIN({arg})"),
        AggFunc::Max => format!("MAX({arg})"),
        AggFunc::Prod => format!("product({arg})"),
        // No boolean type: compare against 0 and cast back after read-back.
        AggFunc::Any => format!("COALESCE(MAX(({arg}) <> 0), 0)"),
        AggFunc::All => format!("COALESCE(MIN(({arg}) <> 0), 1)"),
    }
}

/// Inline SQL expression for a column / constant / criterion / arithmetic
/// operand.
pub fn expression(graph: &Graph, id: NodeId) -> Result<String> {
    let node = graph.node(id)?;
    let operand = |idx: usize| -> Result<String> {
        let dep = node.eval_sources.get(idx).ok_or_else(|| {
            Error::Invariant(format!("{} is missing operand #{}", node.name, idx))
        })?;
        expression(graph, *dep)
    };

    Ok(match &node.op {
        Op::Constant(v) => literal(v),
        Op::Projection { columns, .. } if columns.len() == 1 => {
            qualified(&source(graph, node, 0)?.name, &columns[0])
        }
        Op::Criterion(Criterion::Compare(op)) => {
            format!("({} {} {})", operand(0)?, op.sql(), operand(1)?)
        }
        Op::Criterion(Criterion::Like(pattern)) => {
            format!("({} LIKE {})", operand(0)?, literal(&Scalar::from(pattern.as_str())))
        }
        Op::Criterion(Criterion::IsNull) => format!("({} IS NULL)", operand(0)?),
        Op::Criterion(Criterion::Logical(BoolOp::Not)) => format!("(NOT {})", operand(0)?),
        Op::Criterion(Criterion::Logical(op)) => {
            let kw = if *op == BoolOp::And { "AND" } else { "OR" };
            format!("({} {} {})", operand(0)?, kw, operand(1)?)
        }
        Op::Arithmetic(Arithmetic::Binary(ArithOp::Div)) => {
            format!("(CAST({} AS REAL) / {})", operand(0)?, operand(1)?)
        }
        Op::Arithmetic(Arithmetic::Binary(ArithOp::BitXor)) => {
            let (l, r) = (operand(0)?, operand(1)?);
            format!("(({l} | {r}) - ({l} & {r}))")
        }
        Op::Arithmetic(Arithmetic::Binary(op)) => {
            format!("({} {} {})", operand(0)?, op.sql(), operand(1)?)
        }
        Op::Arithmetic(Arithmetic::Unary(UnaryOp::Neg)) => format!("(- {})", operand(0)?),
        Op::Arithmetic(Arithmetic::Unary(UnaryOp::BitNot)) => format!("(~ {})", operand(0)?),
        _ => {
            return Err(Error::Invariant(format!(
                "{} ({}) cannot be used inside an expression",
                node.name,
                node.op.kind()
            )))
        }
    })
}
