//! Footprint estimation for in-memory tables.
//!
//! Two flavours: `table_bytes` measures a table that exists, and
//! `estimate_rows_bytes` predicts the size of `rows` rows of a schema before
//! they are pulled out of SQLite. Both use the same per-value model so the
//! prediction and the later accounting stay comparable.

use tandem_core::schema::{DataType, Schema};
use tandem_core::types::{Column, Scalar, Table};

/// Fixed cost of a column header (name + vector header).
const COLUMN_OVERHEAD: usize = 24;
/// Heap header of a string / blob value.
const VAR_HEADER: usize = 24;
/// Average payload assumed for text / blob values of unknown length.
const AVG_TEXT: usize = 8;
const AVG_BLOB: usize = 40;

pub fn scalar_bytes(v: &Scalar) -> usize {
    match v {
        Scalar::Null | Scalar::Bool(_) => 1,
        Scalar::I64(_) | Scalar::F64(_) => 8,
        Scalar::Str(s) => VAR_HEADER + s.len(),
        Scalar::Bin(b) => VAR_HEADER + b.len(),
    }
}

fn column_bytes(c: &Column) -> usize {
    COLUMN_OVERHEAD + c.name.len() + c.values.iter().map(scalar_bytes).sum::<usize>()
}

pub fn table_bytes(t: &Table) -> usize {
    t.columns.iter().map(column_bytes).sum()
}

fn type_width(dt: DataType) -> usize {
    match dt {
        DataType::Null | DataType::Boolean => 1,
        DataType::Int64 | DataType::Float64 => 8,
        DataType::Utf8 => VAR_HEADER + AVG_TEXT,
        DataType::Binary => VAR_HEADER + AVG_BLOB,
    }
}

/// Estimated bytes per row of `schema` (minimum 1).
pub fn row_width_bytes(schema: &Schema) -> usize {
    schema
        .fields
        .iter()
        .map(|f| type_width(f.data_type))
        .sum::<usize>()
        .max(1)
}

/// Estimated in-memory footprint of `rows` rows of `schema`.
pub fn estimate_rows_bytes(schema: &Schema, rows: u64) -> usize {
    let headers: usize = schema
        .fields
        .iter()
        .map(|f| COLUMN_OVERHEAD + f.name.len())
        .sum();
    let body = (rows as usize).saturating_mul(row_width_bytes(schema));
    headers.saturating_add(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_core::schema::Field;

    #[test]
    fn test_estimate_matches_numeric_table() {
        let table = Table::from_rows(
            &["a", "b"],
            vec![
                vec![Scalar::I64(1), Scalar::F64(1.5)],
                vec![Scalar::I64(2), Scalar::F64(2.5)],
            ],
        )
        .unwrap();
        let schema = Schema::new(vec![
            Field::new("a", DataType::Int64, false),
            Field::new("b", DataType::Float64, false),
        ]);
        assert_eq!(table_bytes(&table), estimate_rows_bytes(&schema, 2));
    }

    #[test]
    fn test_empty_schema_has_minimum_width() {
        assert_eq!(row_width_bytes(&Schema::default()), 1);
        assert_eq!(estimate_rows_bytes(&Schema::default(), 10), 10);
    }
}
