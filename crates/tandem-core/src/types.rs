//! Lightweight value/column/table types shared by both backends.
//!
//! The in-memory engine (tandem-frame) operates on `Table` directly; the
//! SQLite adapter (tandem-store) converts `Scalar`s to and from SQL values.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::schema::{DataType, Field, Schema};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    Str(String),
    Bin(Vec<u8>),
}

impl Scalar {
    pub fn data_type(&self) -> DataType {
        match self {
            Scalar::Null => DataType::Null,
            Scalar::Bool(_) => DataType::Boolean,
            Scalar::I64(_) => DataType::Int64,
            Scalar::F64(_) => DataType::Float64,
            Scalar::Str(_) => DataType::Utf8,
            Scalar::Bin(_) => DataType::Binary,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// Numeric view; booleans count as 0/1 like they do in SQLite.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Bool(b) => Some(*b as i64 as f64),
            Scalar::I64(i) => Some(*i as f64),
            Scalar::F64(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::Bool(b) => Some(*b as i64),
            Scalar::I64(i) => Some(*i),
            _ => None,
        }
    }

    /// Truthiness used by masks and `any`/`all`. `None` for null.
    pub fn truthy(&self) -> Option<bool> {
        match self {
            Scalar::Null => None,
            Scalar::Bool(b) => Some(*b),
            Scalar::I64(i) => Some(*i != 0),
            Scalar::F64(f) => Some(*f != 0.0),
            Scalar::Str(s) => Some(!s.is_empty()),
            Scalar::Bin(b) => Some(!b.is_empty()),
        }
    }

    /// Convert to `target` after a round trip through a backend that lost
    /// the original type (SQLite stores booleans as integers).
    pub fn coerce(self, target: DataType) -> Scalar {
        match (target, self) {
            (DataType::Boolean, Scalar::I64(i)) => Scalar::Bool(i != 0),
            (DataType::Boolean, Scalar::F64(f)) => Scalar::Bool(f != 0.0),
            (DataType::Float64, Scalar::I64(i)) => Scalar::F64(i as f64),
            (DataType::Float64, Scalar::Bool(b)) => Scalar::F64(b as i64 as f64),
            (DataType::Int64, Scalar::Bool(b)) => Scalar::I64(b as i64),
            (_, v) => v,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => write!(f, "NULL"),
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::I64(i) => write!(f, "{i}"),
            Scalar::F64(x) => write!(f, "{x:?}"),
            Scalar::Str(s) => write!(f, "{s}"),
            Scalar::Bin(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::I64(v)
    }
}

impl From<i32> for Scalar {
    fn from(v: i32) -> Self {
        Scalar::I64(v as i64)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::F64(v)
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::Bool(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::Str(v.to_string())
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Scalar::Str(v)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub values: Vec<Scalar>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<Scalar>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Column type from the observed values (first non-null wins, numerics widen).
    pub fn infer_type(&self) -> DataType {
        self.values
            .iter()
            .fold(DataType::Null, |acc, v| acc.unify(v.data_type()))
    }
}

/// Column-major in-memory table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<Column>,
}

/// Digest identifying a row's key tuple (used for joins / grouping).
pub type RowKey = [u8; 32];

impl Table {
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let table = Self { columns };
        table.validate()?;
        Ok(table)
    }

    /// Build a table from row tuples.
    pub fn from_rows<S: AsRef<str>>(names: &[S], rows: Vec<Vec<Scalar>>) -> Result<Self> {
        let mut columns: Vec<Column> = names
            .iter()
            .map(|n| Column::new(n.as_ref(), Vec::with_capacity(rows.len())))
            .collect();
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != columns.len() {
                return Err(Error::Construction(format!(
                    "row {} has {} values, expected {}",
                    i,
                    row.len(),
                    columns.len()
                )));
            }
            for (col, v) in columns.iter_mut().zip(row) {
                col.values.push(v);
            }
        }
        Table::new(columns)
    }

    fn validate(&self) -> Result<()> {
        let rows = self.num_rows();
        let mut seen = std::collections::HashSet::new();
        for c in &self.columns {
            if c.len() != rows {
                return Err(Error::Construction(format!(
                    "column '{}' has {} rows, expected {}",
                    c.name,
                    c.len(),
                    rows
                )));
            }
            if !seen.insert(c.name.as_str()) {
                return Err(Error::Construction(format!(
                    "duplicate column name '{}'",
                    c.name
                )));
            }
        }
        Ok(())
    }

    pub fn num_rows(&self) -> usize {
        self.columns.first().map(|c| c.len()).unwrap_or(0)
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn infer_schema(&self) -> Schema {
        Schema::new(
            self.columns
                .iter()
                .map(|c| {
                    let nullable = c.values.iter().any(Scalar::is_null);
                    Field::new(c.name.clone(), c.infer_type(), nullable)
                })
                .collect(),
        )
    }

    pub fn row(&self, idx: usize) -> Vec<Scalar> {
        self.columns.iter().map(|c| c.values[idx].clone()).collect()
    }

    /// Keep the rows at `indices`, in that order.
    pub fn take(&self, indices: &[usize]) -> Table {
        Table {
            columns: self
                .columns
                .iter()
                .map(|c| Column {
                    name: c.name.clone(),
                    values: indices.iter().map(|&i| c.values[i].clone()).collect(),
                })
                .collect(),
        }
    }

    fn key_indices(&self, keys: &[String]) -> Result<Vec<usize>> {
        keys.iter()
            .map(|key| {
                self.column_index(key)
                    .ok_or_else(|| Error::Schema(format!("key column '{}' not found", key)))
            })
            .collect()
    }

    /// Sort rows by `(column, ascending)` keys, in order. Stable.
    ///
    /// Nulls sort first ascending and last descending, matching SQLite.
    pub fn sort_by_columns(&mut self, sort_keys: &[(String, bool)]) -> Result<()> {
        let num_rows = self.num_rows();
        if num_rows == 0 {
            return Ok(());
        }
        let names: Vec<String> = sort_keys.iter().map(|(k, _)| k.clone()).collect();
        let key_indices = self.key_indices(&names)?;

        let mut indices: Vec<usize> = (0..num_rows).collect();
        indices.sort_by(|&a, &b| {
            for (&col_idx, (_, ascending)) in key_indices.iter().zip(sort_keys) {
                let values = &self.columns[col_idx].values;
                let ord = scalar_cmp(&values[a], &values[b]);
                let ord = if *ascending { ord } else { ord.reverse() };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });

        *self = self.take(&indices);
        Ok(())
    }

    /// Per-row digest over `keys`; `None` for rows holding a null key
    /// (nulls never compare equal in an equi-join).
    pub fn row_keys(&self, keys: &[String]) -> Result<Vec<Option<RowKey>>> {
        let key_indices = self.key_indices(keys)?;
        let mut out = Vec::with_capacity(self.num_rows());
        for row_idx in 0..self.num_rows() {
            let mut hasher = blake3::Hasher::new();
            let mut has_null = false;
            for &col_idx in &key_indices {
                let v = &self.columns[col_idx].values[row_idx];
                has_null |= v.is_null();
                hash_scalar(v, &mut hasher);
            }
            out.push(if has_null {
                None
            } else {
                Some(*hasher.finalize().as_bytes())
            });
        }
        Ok(out)
    }

    /// Per-row digest over every column (null-aware; used by de-duplication
    /// and grouping where NULL forms its own group).
    pub fn row_digests(&self, keys: &[String]) -> Result<Vec<RowKey>> {
        let key_indices = self.key_indices(keys)?;
        Ok((0..self.num_rows())
            .map(|row_idx| {
                let mut hasher = blake3::Hasher::new();
                for &col_idx in &key_indices {
                    hash_scalar(&self.columns[col_idx].values[row_idx], &mut hasher);
                }
                *hasher.finalize().as_bytes()
            })
            .collect())
    }
}

/// Compare two scalar tuples lexicographically for sorting.
pub fn scalar_tuple_cmp(a: &[Scalar], b: &[Scalar]) -> Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        match scalar_cmp(x, y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    a.len().cmp(&b.len())
}

/// Compare two scalars for sorting.
///
/// Nulls are sorted first, numbers compare numerically across Int/Float/Bool,
/// then text, then blobs (SQLite's storage-class order).
pub fn scalar_cmp(a: &Scalar, b: &Scalar) -> Ordering {
    use Scalar::*;

    match (a, b) {
        (Null, Null) => Ordering::Equal,
        (Null, _) => Ordering::Less,
        (_, Null) => Ordering::Greater,
        (I64(x), I64(y)) => x.cmp(y),
        (Str(x), Str(y)) => x.cmp(y),
        (Bin(x), Bin(y)) => x.cmp(y),
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => {
                if x.is_nan() && y.is_nan() {
                    Ordering::Equal
                } else if x.is_nan() {
                    Ordering::Greater
                } else if y.is_nan() {
                    Ordering::Less
                } else {
                    x.partial_cmp(&y).unwrap_or(Ordering::Equal)
                }
            }
            // Mixed types: order by storage class
            _ => scalar_type_order(a).cmp(&scalar_type_order(b)),
        },
    }
}

/// Assign a numeric order to scalar storage classes for mixed-type comparisons.
fn scalar_type_order(s: &Scalar) -> u8 {
    use Scalar::*;
    match s {
        Null => 0,
        Bool(_) | I64(_) | F64(_) => 1,
        Str(_) => 2,
        Bin(_) => 3,
    }
}

/// Hash a scalar value into a hasher. Integral floats and booleans hash like
/// the equal integer so `2 = 2.0` holds for keys, as it does in SQL.
fn hash_scalar(scalar: &Scalar, hasher: &mut blake3::Hasher) {
    use Scalar::*;

    hasher.update(&[scalar_type_order(scalar)]);

    match scalar {
        Null => {}
        Bool(b) => {
            hasher.update(&(*b as i64).to_le_bytes());
        }
        I64(i) => {
            hasher.update(&i.to_le_bytes());
        }
        F64(f) => {
            if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                hasher.update(&(*f as i64).to_le_bytes());
            } else {
                hasher.update(&f.to_bits().to_le_bytes());
            }
        }
        Str(s) => {
            hasher.update(&(s.len() as u64).to_le_bytes());
            hasher.update(s.as_bytes());
        }
        Bin(b) => {
            hasher.update(&(b.len() as u64).to_le_bytes());
            hasher.update(b);
        }
    }
}
