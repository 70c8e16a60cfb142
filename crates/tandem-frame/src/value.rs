//! Materialized node results.

use serde::{Deserialize, Serialize};

use tandem_core::types::{Column, Scalar, Table};

use crate::error::{FrameError, Result};

/// A materialized result held in memory.
///
/// Most nodes produce a `Table`. Scalar aggregates collapse to a `Scalar`
/// (one column) or a labelled `Series` (one entry per aggregated column).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Table(Table),
    Series(Vec<(String, Scalar)>),
    Scalar(Scalar),
}

impl Value {
    pub fn as_table(&self) -> Option<&Table> {
        match self {
            Value::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Value::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_series(&self) -> Option<&[(String, Scalar)]> {
        match self {
            Value::Series(s) => Some(s),
            _ => None,
        }
    }

    /// Table view of any value. Collapsed aggregates become a single row
    /// named after `columns`.
    pub fn to_table(&self, columns: &[String]) -> Result<Table> {
        match self {
            Value::Table(t) => Ok(t.clone()),
            Value::Series(entries) => Ok(Table::new(
                entries
                    .iter()
                    .map(|(name, v)| Column::new(name.clone(), vec![v.clone()]))
                    .collect(),
            )?),
            Value::Scalar(v) => {
                let name = columns.first().ok_or_else(|| {
                    FrameError::Schema("scalar value without a column name".into())
                })?;
                Ok(Table::new(vec![Column::new(name.clone(), vec![v.clone()])])?)
            }
        }
    }

    /// Collapse a one-row aggregate table: a single column becomes a
    /// `Scalar`, several become a labelled `Series`.
    pub fn collapse(table: Table) -> Value {
        if table.num_rows() != 1 {
            return Value::Table(table);
        }
        let mut entries: Vec<(String, Scalar)> = table
            .columns
            .into_iter()
            .map(|mut c| (c.name, c.values.pop().unwrap_or(Scalar::Null)))
            .collect();
        if entries.len() == 1 {
            let (_, v) = entries.remove(0);
            Value::Scalar(v)
        } else {
            Value::Series(entries)
        }
    }

    /// Bytes held by this value, in the accounting model of `tandem-mem`.
    pub fn footprint(&self) -> usize {
        match self {
            Value::Table(t) => tandem_mem::table_bytes(t),
            Value::Series(entries) => entries
                .iter()
                .map(|(n, v)| n.len() + tandem_mem::scalar_bytes(v))
                .sum(),
            Value::Scalar(v) => tandem_mem::scalar_bytes(v),
        }
    }
}
