//! In-memory evaluation of a single node.
//!
//! Inputs are fetched through a callback so this module never touches engine
//! state; the engine guarantees every input is cached before calling in.

use std::borrow::Cow;
use std::sync::Arc;

use tandem_core::error::Error;
use tandem_core::id::NodeId;
use tandem_core::ops::BoolOp;
use tandem_core::schema::Schema;
use tandem_core::types::{Column, Scalar, Table};
use tandem_frame::{aggregate, describe, filter, join, kernels, project, sort, FrameError, Value};
use tandem_graph::node::{Arithmetic, Criterion, FallbackOp, Node, Op};
use tandem_graph::Graph;

use crate::error::Result;

/// Restore declared column types after a trip through SQLite.
pub fn coerce_table(mut table: Table, schema: &Schema) -> Table {
    for col in table.columns.iter_mut() {
        if let Some(field) = schema.field_named(&col.name) {
            let target = field.data_type;
            let values = std::mem::take(&mut col.values);
            col.values = values.into_iter().map(|v| v.coerce(target)).collect();
        }
    }
    table
}

fn as_table<'v>(value: &'v Value, columns: &[String]) -> Result<Cow<'v, Table>> {
    Ok(match value {
        Value::Table(t) => Cow::Borrowed(t),
        other => Cow::Owned(other.to_table(columns)?),
    })
}

struct Inputs<'g, F> {
    graph: &'g Graph,
    fetch: F,
}

impl<'g, F> Inputs<'g, F>
where
    F: Fn(NodeId) -> Result<Arc<Value>>,
{
    fn value(&self, id: NodeId) -> Result<(Arc<Value>, &'g Node)> {
        Ok(((self.fetch)(id)?, self.graph.node(id)?))
    }

    fn rows(&self, id: NodeId) -> Result<usize> {
        let (value, node) = self.value(id)?;
        let rows = as_table(&value, &node.columns())?.num_rows();
        Ok(rows)
    }

    /// Values of an expression operand, constants broadcast to `rows`.
    fn operand(&self, id: NodeId, rows: usize) -> Result<Vec<Scalar>> {
        let node = self.graph.node(id)?;
        if let Op::Constant(v) = &node.op {
            return Ok(vec![v.clone(); rows]);
        }
        let (value, node) = self.value(id)?;
        let table = as_table(&value, &node.columns())?;
        let col = table
            .columns
            .first()
            .ok_or_else(|| FrameError::Schema(format!("{} has no columns", node.name)))?;
        if col.len() != rows {
            return Err(FrameError::Length {
                expected: rows,
                actual: col.len(),
            }
            .into());
        }
        Ok(col.values.clone())
    }
}

fn nth(ids: &[NodeId], idx: usize, node: &Node) -> Result<NodeId> {
    ids.get(idx).copied().ok_or_else(|| {
        Error::Invariant(format!("{} is missing input #{}", node.name, idx)).into()
    })
}

fn single_column(node: &Node, values: Vec<Scalar>) -> Result<Value> {
    let name = node
        .schema
        .field(0)
        .map(|f| f.name.clone())
        .ok_or_else(|| FrameError::Schema(format!("{} has no output column", node.name)))?;
    Ok(Value::Table(Table::new(vec![Column::new(name, values)])?))
}

/// Evaluate `id` in memory from its cached inputs.
pub fn evaluate<F>(graph: &Graph, id: NodeId, fetch: F) -> Result<Value>
where
    F: Fn(NodeId) -> Result<Arc<Value>>,
{
    let inputs = Inputs { graph, fetch };
    let node = graph.node(id)?;
    let src = |idx: usize| nth(&node.sources, idx, node);
    let operand = |idx: usize| nth(&node.eval_sources, idx, node);

    // Owned input table of `sources[idx]`.
    let source_table = |idx: usize| -> Result<(Arc<Value>, Vec<String>)> {
        let (value, n) = inputs.value(src(idx)?)?;
        Ok((value, n.columns()))
    };

    let out = match &node.op {
        Op::Source | Op::GroupBy { .. } | Op::GroupByProjection { .. } => {
            return Err(Error::Invariant(format!(
                "{} ({}) is never evaluated",
                node.name,
                node.op.kind()
            ))
            .into())
        }

        Op::Constant(v) => Value::Scalar(v.clone()),

        Op::Criterion(c) => {
            let rows = inputs.rows(src(0)?)?;
            let a = inputs.operand(operand(0)?, rows)?;
            let values = match c {
                Criterion::Compare(op) => {
                    kernels::compare(*op, &a, &inputs.operand(operand(1)?, rows)?)?
                }
                Criterion::Like(pattern) => kernels::like(&a, pattern),
                Criterion::IsNull => kernels::is_null(&a),
                Criterion::Logical(BoolOp::Not) => kernels::not(&a),
                Criterion::Logical(op) => {
                    kernels::logical(*op, &a, &inputs.operand(operand(1)?, rows)?)?
                }
            };
            single_column(node, values)?
        }

        Op::Arithmetic(arith) => {
            let rows = inputs.rows(src(0)?)?;
            let a = inputs.operand(operand(0)?, rows)?;
            let values = match arith {
                Arithmetic::Binary(op) => {
                    kernels::arith(*op, &a, &inputs.operand(operand(1)?, rows)?)?
                }
                Arithmetic::Unary(op) => kernels::unary(*op, &a)?,
            };
            single_column(node, values)?
        }

        Op::Projection { columns, distinct } => {
            let (v, cols) = source_table(0)?;
            let table = as_table(&v, &cols)?;
            let selected = project::select(&table, columns)?;
            if *distinct {
                Value::Table(project::drop_duplicates(&selected)?)
            } else {
                Value::Table(selected)
            }
        }

        Op::Selection => {
            let (v, cols) = source_table(0)?;
            let table = as_table(&v, &cols)?;
            let mask = inputs.operand(operand(0)?, table.num_rows())?;
            Value::Table(filter::filter(&table, &mask)?)
        }

        Op::Join {
            left_on,
            right_on,
            how,
            layout,
        } => {
            let (lv, lcols) = source_table(0)?;
            let (rv, rcols) = source_table(1)?;
            let left = as_table(&lv, &lcols)?;
            let right = as_table(&rv, &rcols)?;
            Value::Table(join::hash_join(
                &left,
                &right,
                left_on,
                right_on,
                *how,
                layout,
            )?)
        }

        Op::Union => {
            let mut held = Vec::with_capacity(node.sources.len());
            for idx in 0..node.sources.len() {
                held.push(source_table(idx)?);
            }
            let tables = held
                .iter()
                .map(|(v, cols)| as_table(v, cols))
                .collect::<Result<Vec<_>>>()?;
            let refs: Vec<&Table> = tables.iter().map(|t| t.as_ref()).collect();
            Value::Table(project::concat(&refs, &node.columns())?)
        }

        Op::OrderBy { keys } => {
            let (v, cols) = source_table(0)?;
            let table = as_table(&v, &cols)?;
            Value::Table(sort::sort_values(&table, keys)?)
        }

        Op::Limit { n } => {
            let (v, cols) = source_table(0)?;
            let table = as_table(&v, &cols)?;
            Value::Table(filter::limit(&table, *n))
        }

        Op::Aggregator {
            func,
            input,
            keys,
            columns,
        } => {
            let (v, n) = inputs.value(*input)?;
            let table = as_table(&v, &n.columns())?;
            if keys.is_empty() {
                Value::collapse(aggregate::aggregate_table(&table, *func, columns)?)
            } else {
                Value::Table(aggregate::group_aggregate(&table, keys, columns, *func)?)
            }
        }

        Op::Rename { mapping } => {
            let (v, cols) = source_table(0)?;
            let table = as_table(&v, &cols)?;
            Value::Table(project::rename(&table, mapping)?)
        }

        Op::Assign { column } => {
            let (v, cols) = source_table(0)?;
            let table = as_table(&v, &cols)?;
            let values = inputs.operand(operand(0)?, table.num_rows())?;
            Value::Table(project::assign_column(&table, column, values)?)
        }

        Op::Fallback(FallbackOp::Describe) => {
            let (v, cols) = source_table(0)?;
            let table = as_table(&v, &cols)?;
            Value::Table(describe::describe(&table)?)
        }

        Op::Fallback(FallbackOp::Apply { name, func }) => {
            let (v, cols) = source_table(0)?;
            let table = as_table(&v, &cols)?;
            let out = func(table.as_ref())?;
            let declared = node.columns();
            if out.column_names() != declared {
                return Err(Error::Schema(format!(
                    "{} returned columns {:?}, declared {:?}",
                    name,
                    out.column_names(),
                    declared
                ))
                .into());
            }
            Value::Table(coerce_table(out, &node.schema))
        }
    };
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tandem_core::ops::{AggFunc, ArithOp, CompareOp};

    fn fixture() -> (Graph, NodeId, HashMap<NodeId, Arc<Value>>) {
        let table = Table::from_rows(
            &["k", "v"],
            vec![
                vec![Scalar::from("a"), Scalar::I64(1)],
                vec![Scalar::from("b"), Scalar::I64(2)],
                vec![Scalar::from("a"), Scalar::I64(3)],
            ],
        )
        .unwrap();
        let mut g = Graph::new("e");
        let t = g.source(table.infer_schema()).unwrap();
        let cache = HashMap::from([(t, Arc::new(Value::Table(table)))]);
        (g, t, cache)
    }

    fn eval_into(g: &Graph, id: NodeId, cache: &mut HashMap<NodeId, Arc<Value>>) -> Arc<Value> {
        let v = Arc::new(
            evaluate(g, id, |dep| {
                cache
                    .get(&dep)
                    .cloned()
                    .ok_or_else(|| Error::Invariant(format!("{dep} not cached")).into())
            })
            .unwrap(),
        );
        cache.insert(id, v.clone());
        v
    }

    #[test]
    fn test_selection_via_criterion() {
        let (mut g, t, mut cache) = fixture();
        let v = g.projection(t, &["v"], false).unwrap();
        let two = g.constant(Scalar::I64(2));
        let ge = g.compare(CompareOp::Ge, v, two).unwrap();
        let sel = g.selection(t, ge).unwrap();
        eval_into(&g, v, &mut cache);
        eval_into(&g, ge, &mut cache);
        let out = eval_into(&g, sel, &mut cache);
        let out = out.as_table().unwrap();
        assert_eq!(out.column("v").unwrap().values, vec![Scalar::I64(2), Scalar::I64(3)]);
    }

    #[test]
    fn test_assign_broadcasts_constant() {
        let (mut g, t, mut cache) = fixture();
        let v = g.projection(t, &["v"], false).unwrap();
        let ten = g.constant(Scalar::I64(10));
        let prod = g.arith(ArithOp::Mul, v, ten).unwrap();
        let a = g.assign(t, "w", prod).unwrap();
        eval_into(&g, v, &mut cache);
        eval_into(&g, prod, &mut cache);
        let out = eval_into(&g, a, &mut cache);
        assert_eq!(
            out.as_table().unwrap().column("w").unwrap().values,
            vec![Scalar::I64(10), Scalar::I64(20), Scalar::I64(30)]
        );
    }

    #[test]
    fn test_scalar_aggregate_collapses() {
        let (mut g, t, mut cache) = fixture();
        let v = g.projection(t, &["v"], false).unwrap();
        let sum = g.aggregate(v, AggFunc::Sum).unwrap();
        eval_into(&g, v, &mut cache);
        assert_eq!(*eval_into(&g, sum, &mut cache), Value::Scalar(Scalar::I64(6)));
    }

    #[test]
    fn test_apply_checks_declared_columns() {
        let (mut g, t, cache) = fixture();
        let f: tandem_graph::node::TableFn = Arc::new(|t: &Table| Ok(t.clone()));
        let schema = Schema::new(vec![tandem_core::schema::Field::new(
            "only",
            tandem_core::schema::DataType::Int64,
            false,
        )]);
        let app = g.apply(t, "identity", schema, f).unwrap();
        let err = evaluate(&g, app, |dep| {
            cache
                .get(&dep)
                .cloned()
                .ok_or_else(|| Error::Invariant("missing".into()).into())
        });
        assert!(matches!(
            err,
            Err(crate::error::ExecError::Core(Error::Schema(_)))
        ));
    }

    #[test]
    fn test_coerce_restores_booleans() {
        let t = Table::from_rows(&["b"], vec![vec![Scalar::I64(1)], vec![Scalar::Null]]).unwrap();
        let schema = Schema::new(vec![tandem_core::schema::Field::new(
            "b",
            tandem_core::schema::DataType::Boolean,
            true,
        )]);
        assert_eq!(
            coerce_table(t, &schema).column("b").unwrap().values,
            vec![Scalar::Bool(true), Scalar::Null]
        );
    }
}
