//! Logical schema types. Pure data; both backends map onto these.
//!
//! Every node in the graph carries a `Schema` inferred at construction time,
//! so column names and types are known without touching either backend.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    /// Unknown / all-null column.
    Null,
    Boolean,
    Int64,
    Float64,
    Utf8,
    Binary,
}

impl DataType {
    pub fn is_numeric(self) -> bool {
        matches!(self, DataType::Boolean | DataType::Int64 | DataType::Float64)
    }

    /// Result type of a numeric binary operation over `self` and `other`.
    pub fn promote(self, other: DataType) -> DataType {
        use DataType::*;
        match (self, other) {
            (Float64, _) | (_, Float64) => Float64,
            (Null, t) | (t, Null) => t,
            (Int64 | Boolean, Int64 | Boolean) => Int64,
            (a, _) => a,
        }
    }

    /// Widen two observed value types into one column type.
    pub fn unify(self, other: DataType) -> DataType {
        use DataType::*;
        match (self, other) {
            (a, b) if a == b => a,
            (Null, t) | (t, Null) => t,
            (Int64 | Float64 | Boolean, Int64 | Float64 | Boolean) => self.promote(other),
            // Mixed text/numeric columns are kept as text.
            _ => Utf8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, data_type: DataType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable,
        }
    }

    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Schema {
    pub fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn field(&self, idx: usize) -> Option<&Field> {
        self.fields.get(idx)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn field_named(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    pub fn names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Fail with a construction error naming every column of `cols` missing here.
    pub fn require_columns<S: AsRef<str>>(&self, cols: &[S]) -> Result<()> {
        let missing: Vec<&str> = cols
            .iter()
            .map(|c| c.as_ref())
            .filter(|c| !self.contains(c))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::Construction(format!(
                "columns {:?} not found in {:?}",
                missing,
                self.names()
            )))
        }
    }

    /// Sub-schema in the order given by `cols`.
    pub fn project<S: AsRef<str>>(&self, cols: &[S]) -> Result<Schema> {
        self.require_columns(cols)?;
        let fields = cols
            .iter()
            .filter_map(|c| self.field_named(c.as_ref()).cloned())
            .collect();
        Ok(Schema { fields })
    }

    /// Same column set regardless of order.
    pub fn same_columns(&self, other: &Schema) -> bool {
        self.len() == other.len() && self.fields.iter().all(|f| other.contains(&f.name))
    }
}

/// Output column layout of an equi-join.
///
/// Key pairs with identical names on both sides are merged into a single
/// output column taken from the left. Every other name present on both sides
/// is suffixed with `_x` (left) and `_y` (right).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinLayout {
    /// (left column, output name) in left order.
    pub left: Vec<(String, String)>,
    /// (right column, output name) in right order, merged keys excluded.
    pub right: Vec<(String, String)>,
    pub schema: Schema,
}

pub const LEFT_SUFFIX: &str = "_x";
pub const RIGHT_SUFFIX: &str = "_y";

impl JoinLayout {
    pub fn new(
        left: &Schema,
        right: &Schema,
        left_on: &[String],
        right_on: &[String],
        left_outer: bool,
    ) -> Result<Self> {
        if left_on.is_empty() || left_on.len() != right_on.len() {
            return Err(Error::Construction(format!(
                "join keys must be non-empty and paired, got {} left and {} right",
                left_on.len(),
                right_on.len()
            )));
        }
        left.require_columns(left_on)?;
        right.require_columns(right_on)?;

        let merged: Vec<&String> = left_on
            .iter()
            .zip(right_on)
            .filter(|(l, r)| l == r)
            .map(|(l, _)| l)
            .collect();
        let overlapping = |name: &String| {
            !merged.contains(&name) && left.contains(name) && right.contains(name)
        };

        let mut fields = Vec::with_capacity(left.len() + right.len());
        let mut left_cols = Vec::with_capacity(left.len());
        for f in &left.fields {
            let out = if overlapping(&f.name) {
                format!("{}{}", f.name, LEFT_SUFFIX)
            } else {
                f.name.clone()
            };
            left_cols.push((f.name.clone(), out.clone()));
            fields.push(f.renamed(out));
        }

        let mut right_cols = Vec::with_capacity(right.len());
        for f in &right.fields {
            if merged.contains(&&f.name) {
                continue;
            }
            let out = if overlapping(&f.name) {
                format!("{}{}", f.name, RIGHT_SUFFIX)
            } else {
                f.name.clone()
            };
            right_cols.push((f.name.clone(), out.clone()));
            let mut field = f.renamed(out);
            field.nullable |= left_outer;
            fields.push(field);
        }

        let schema = Schema { fields };
        let mut seen = std::collections::HashSet::new();
        for f in &schema.fields {
            if !seen.insert(f.name.as_str()) {
                return Err(Error::Construction(format!(
                    "join produces duplicate output column '{}'",
                    f.name
                )));
            }
        }

        Ok(Self {
            left: left_cols,
            right: right_cols,
            schema,
        })
    }
}
