//! Column-level reshaping: projection, rename, de-duplication, concatenation
//! and single-column assignment.

use std::collections::HashSet;

use tandem_core::types::{Column, Scalar, Table};

use crate::error::{FrameError, Result};

fn column<'a>(table: &'a Table, name: &str) -> Result<&'a Column> {
    table
        .column(name)
        .ok_or_else(|| FrameError::Schema(format!("column '{}' not found", name)))
}

/// Keep `columns`, in the order given.
pub fn select<S: AsRef<str>>(table: &Table, columns: &[S]) -> Result<Table> {
    let cols = columns
        .iter()
        .map(|c| column(table, c.as_ref()).cloned())
        .collect::<Result<Vec<_>>>()?;
    Ok(Table::new(cols)?)
}

/// Rename columns by `(from, to)` pairs; unmapped columns keep their names.
pub fn rename(table: &Table, mapping: &[(String, String)]) -> Result<Table> {
    for (from, _) in mapping {
        column(table, from)?;
    }
    let cols = table
        .columns
        .iter()
        .map(|c| {
            let name = mapping
                .iter()
                .find(|(from, _)| *from == c.name)
                .map(|(_, to)| to.clone())
                .unwrap_or_else(|| c.name.clone());
            Column::new(name, c.values.clone())
        })
        .collect();
    Ok(Table::new(cols)?)
}

/// Drop repeated rows, keeping the first occurrence.
pub fn drop_duplicates(table: &Table) -> Result<Table> {
    let digests = table.row_digests(&table.column_names())?;
    let mut seen = HashSet::with_capacity(digests.len());
    let keep: Vec<usize> = digests
        .iter()
        .enumerate()
        .filter(|(_, d)| seen.insert(**d))
        .map(|(i, _)| i)
        .collect();
    Ok(table.take(&keep))
}

/// Stack tables vertically. Columns are matched by name and emitted in the
/// order of `columns`.
pub fn concat<S: AsRef<str>>(tables: &[&Table], columns: &[S]) -> Result<Table> {
    let mut out: Vec<Column> = columns
        .iter()
        .map(|c| Column::new(c.as_ref(), Vec::new()))
        .collect();
    for table in tables {
        if table.num_columns() != out.len() {
            return Err(FrameError::Schema(format!(
                "cannot concatenate {} columns onto {}",
                table.num_columns(),
                out.len()
            )));
        }
        for col in out.iter_mut() {
            col.values
                .extend(column(table, &col.name)?.values.iter().cloned());
        }
    }
    Ok(Table::new(out)?)
}

/// Replace column `name` with `values`, or append it when absent.
pub fn assign_column(table: &Table, name: &str, values: Vec<Scalar>) -> Result<Table> {
    let rows = table.num_rows();
    if values.len() != rows && table.num_columns() > 0 {
        return Err(FrameError::Length {
            expected: rows,
            actual: values.len(),
        });
    }
    let mut out = table.clone();
    match out.column_index(name) {
        Some(idx) => out.columns[idx].values = values,
        None => out.columns.push(Column::new(name, values)),
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        Table::from_rows(
            &["a", "b"],
            vec![
                vec![Scalar::I64(1), Scalar::from("x")],
                vec![Scalar::I64(2), Scalar::from("y")],
                vec![Scalar::I64(1), Scalar::from("x")],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_select_reorders_columns() {
        let t = select(&sample(), &["b", "a"]).unwrap();
        assert_eq!(t.column_names(), vec!["b", "a"]);
        assert!(select(&sample(), &["missing"]).is_err());
    }

    #[test]
    fn test_drop_duplicates_keeps_first() {
        let t = drop_duplicates(&sample()).unwrap();
        assert_eq!(t.num_rows(), 2);
        assert_eq!(t.row(0), vec![Scalar::I64(1), Scalar::from("x")]);
    }

    #[test]
    fn test_concat_matches_by_name() {
        let a = sample();
        let b = select(&sample(), &["b", "a"]).unwrap();
        let t = concat(&[&a, &b], &["a", "b"]).unwrap();
        assert_eq!(t.num_rows(), 6);
        assert_eq!(t.column("a").unwrap().values[3], Scalar::I64(1));
    }

    #[test]
    fn test_assign_replaces_or_appends() {
        let vals = vec![Scalar::I64(7); 3];
        let replaced = assign_column(&sample(), "a", vals.clone()).unwrap();
        assert_eq!(replaced.column_names(), vec!["a", "b"]);
        let appended = assign_column(&sample(), "c", vals).unwrap();
        assert_eq!(appended.column_names(), vec!["a", "b", "c"]);
    }
}
