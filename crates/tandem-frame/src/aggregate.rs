//! Scalar and grouped aggregation.
//!
//! Nulls are skipped by every function. Empty inputs give `0` for sum,
//! `1` for prod, `false` for any, `true` for all and null for mean/min/max,
//! matching the SQL the compiler emits. Grouped output is sorted by key with
//! the null group first.

use std::collections::HashMap;

use tandem_core::ops::AggFunc;
use tandem_core::types::{scalar_cmp, scalar_tuple_cmp, Column, RowKey, Scalar, Table};

use crate::error::{FrameError, Result};

/// Aggregate one column of values.
pub fn aggregate_values(func: AggFunc, values: &[Scalar]) -> Result<Scalar> {
    let present = values.iter().filter(|v| !v.is_null());
    Ok(match func {
        AggFunc::Count => Scalar::I64(present.count() as i64),
        AggFunc::Sum => {
            let (total, exact) = fold_numeric(present, Scalar::I64(0), i64::checked_add, |a, b| a + b)?;
            // SQLite's SUM refuses to leave integers on its own.
            if !exact {
                return Err(FrameError::Overflow("sum".into()));
            }
            total
        }
        AggFunc::Prod => fold_numeric(present, Scalar::I64(1), i64::checked_mul, |a, b| a * b)?.0,
        AggFunc::Mean => {
            let mut n = 0usize;
            let mut total = 0.0;
            for v in present {
                total += as_number(v)?;
                n += 1;
            }
            if n == 0 {
                Scalar::Null
            } else {
                Scalar::F64(total / n as f64)
            }
        }
        AggFunc::Min => present
            .min_by(|a, b| scalar_cmp(a, b))
            .cloned()
            .unwrap_or(Scalar::Null),
        AggFunc::Max => present
            .max_by(|a, b| scalar_cmp(a, b))
            .cloned()
            .unwrap_or(Scalar::Null),
        AggFunc::Any => Scalar::Bool(present.filter_map(Scalar::truthy).any(|b| b)),
        AggFunc::All => Scalar::Bool(present.filter_map(Scalar::truthy).all(|b| b)),
    })
}

fn as_number(v: &Scalar) -> Result<f64> {
    v.as_f64()
        .ok_or_else(|| FrameError::Type(format!("cannot aggregate non-numeric value {:?}", v)))
}

/// Fold with integer arithmetic while every input is integral, switching to
/// floats on the first float input or overflow.
///
/// The flag is false when an all-integer input overflowed into floats.
fn fold_numeric<'a>(
    values: impl Iterator<Item = &'a Scalar>,
    init: Scalar,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Result<(Scalar, bool)> {
    let mut acc = init;
    let mut overflowed = false;
    let mut saw_float = false;
    for v in values {
        let x = as_number(v)?;
        acc = match (&acc, v.as_i64()) {
            (Scalar::I64(a), Some(b)) => match int_op(*a, b) {
                Some(r) => Scalar::I64(r),
                None => {
                    overflowed = true;
                    Scalar::F64(float_op(*a as f64, b as f64))
                }
            },
            (_, b) => {
                saw_float |= b.is_none();
                Scalar::F64(float_op(acc.as_f64().unwrap_or(0.0), x))
            }
        };
    }
    Ok((acc, saw_float || !overflowed))
}

/// Aggregate whole columns into a single-row table.
pub fn aggregate_table(table: &Table, func: AggFunc, columns: &[String]) -> Result<Table> {
    let cols = columns
        .iter()
        .map(|name| {
            let col = table
                .column(name)
                .ok_or_else(|| FrameError::Schema(format!("column '{}' not found", name)))?;
            Ok(Column::new(
                name.clone(),
                vec![aggregate_values(func, &col.values)?],
            ))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Table::new(cols)?)
}

/// Group by `keys` and aggregate each of `columns`. Output columns are the
/// keys followed by `columns`, one row per distinct key tuple.
pub fn group_aggregate(
    table: &Table,
    keys: &[String],
    columns: &[String],
    func: AggFunc,
) -> Result<Table> {
    let digests = table.row_digests(keys)?;

    let mut slot_of: HashMap<RowKey, usize> = HashMap::new();
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for (row, digest) in digests.iter().enumerate() {
        let slot = *slot_of.entry(*digest).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(row);
    }

    let key_cols = keys
        .iter()
        .map(|k| {
            table
                .column(k)
                .ok_or_else(|| FrameError::Schema(format!("group key '{}' not found", k)))
        })
        .collect::<Result<Vec<_>>>()?;
    let key_tuple = |rows: &[usize]| -> Vec<Scalar> {
        key_cols.iter().map(|c| c.values[rows[0]].clone()).collect()
    };

    groups.sort_by(|a, b| scalar_tuple_cmp(&key_tuple(a.as_slice()), &key_tuple(b.as_slice())));

    let mut out: Vec<Column> = keys.iter().map(|k| Column::new(k.clone(), Vec::new())).collect();
    for (i, key_col) in key_cols.iter().enumerate() {
        out[i].values = groups.iter().map(|g| key_col.values[g[0]].clone()).collect();
    }
    for name in columns {
        let col = table
            .column(name)
            .ok_or_else(|| FrameError::Schema(format!("column '{}' not found", name)))?;
        let mut values = Vec::with_capacity(groups.len());
        for g in &groups {
            let group_values: Vec<Scalar> = g.iter().map(|&r| col.values[r].clone()).collect();
            values.push(aggregate_values(func, &group_values)?);
        }
        out.push(Column::new(name.clone(), values));
    }
    Ok(Table::new(out)?)
}
