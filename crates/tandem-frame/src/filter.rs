//! Boolean-mask row filtering.

use tandem_core::types::{Scalar, Table};

use crate::error::{FrameError, Result};

/// Keep the rows whose mask entry is truthy. Null counts as false, like a
/// SQL `WHERE` clause.
pub fn filter(table: &Table, mask: &[Scalar]) -> Result<Table> {
    if mask.len() != table.num_rows() {
        return Err(FrameError::Length {
            expected: table.num_rows(),
            actual: mask.len(),
        });
    }
    let keep: Vec<usize> = mask
        .iter()
        .enumerate()
        .filter(|(_, m)| m.truthy() == Some(true))
        .map(|(i, _)| i)
        .collect();
    Ok(table.take(&keep))
}

/// First `n` rows.
pub fn limit(table: &Table, n: usize) -> Table {
    let n = n.min(table.num_rows());
    let keep: Vec<usize> = (0..n).collect();
    table.take(&keep)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_mask_entries_drop_rows() {
        let t = Table::from_rows(
            &["a"],
            vec![vec![Scalar::I64(1)], vec![Scalar::I64(2)], vec![Scalar::I64(3)]],
        )
        .unwrap();
        let out = filter(&t, &[Scalar::Bool(true), Scalar::Null, Scalar::Bool(true)]).unwrap();
        assert_eq!(out.column("a").unwrap().values, vec![Scalar::I64(1), Scalar::I64(3)]);
        assert!(filter(&t, &[Scalar::Bool(true)]).is_err());
    }

    #[test]
    fn test_limit_clamps() {
        let t = Table::from_rows(&["a"], vec![vec![Scalar::I64(1)]]).unwrap();
        assert_eq!(limit(&t, 5).num_rows(), 1);
        assert_eq!(limit(&t, 0).num_rows(), 0);
    }
}
