//! Sorting.
//!
//! Stable multi-key sort on top of `Table::sort_by_columns`. Nulls sort first
//! ascending and last descending, the same as SQLite's `ORDER BY`.

use tandem_core::types::Table;

use crate::error::Result;

/// Sort by `(column, ascending)` keys.
pub fn sort_values(table: &Table, keys: &[(String, bool)]) -> Result<Table> {
    let mut out = table.clone();
    out.sort_by_columns(keys)?;
    Ok(out)
}
