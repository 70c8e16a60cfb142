//! Hash equi-join.
//!
//! Builds a hash table over the right side keyed by the blake3 digest of the
//! key tuple, then looks up each left row in order. Output rows follow
//! left order, and right matches keep right order. Null keys never match.

use std::collections::HashMap;

use tandem_core::ops::JoinType;
use tandem_core::schema::JoinLayout;
use tandem_core::types::{Column, RowKey, Scalar, Table};

use crate::error::{FrameError, Result};

pub fn hash_join(
    left: &Table,
    right: &Table,
    left_on: &[String],
    right_on: &[String],
    how: JoinType,
    layout: &JoinLayout,
) -> Result<Table> {
    if left_on.len() != right_on.len() || left_on.is_empty() {
        return Err(FrameError::Schema(format!(
            "join keys must be non-empty and paired, got {} left and {} right",
            left_on.len(),
            right_on.len()
        )));
    }

    let left_keys = left.row_keys(left_on)?;
    let right_keys = right.row_keys(right_on)?;

    let mut build: HashMap<RowKey, Vec<usize>> = HashMap::new();
    for (idx, key) in right_keys.iter().enumerate() {
        if let Some(k) = key {
            build.entry(*k).or_default().push(idx);
        }
    }

    // (left row, Some(right row) | None for unmatched left rows)
    let mut pairs: Vec<(usize, Option<usize>)> = Vec::with_capacity(left.num_rows());
    for (l_idx, key) in left_keys.iter().enumerate() {
        match key.as_ref().and_then(|k| build.get(k)) {
            Some(matches) => pairs.extend(matches.iter().map(|&r| (l_idx, Some(r)))),
            None if how == JoinType::Left => pairs.push((l_idx, None)),
            None => {}
        }
    }

    let mut columns = Vec::with_capacity(layout.left.len() + layout.right.len());
    for (src, out) in &layout.left {
        let col = left
            .column(src)
            .ok_or_else(|| FrameError::Schema(format!("left column '{}' not found", src)))?;
        columns.push(Column::new(
            out.clone(),
            pairs.iter().map(|(l, _)| col.values[*l].clone()).collect(),
        ));
    }
    for (src, out) in &layout.right {
        let col = right
            .column(src)
            .ok_or_else(|| FrameError::Schema(format!("right column '{}' not found", src)))?;
        columns.push(Column::new(
            out.clone(),
            pairs
                .iter()
                .map(|(_, r)| r.map(|r| col.values[r].clone()).unwrap_or(Scalar::Null))
                .collect(),
        ));
    }

    Ok(Table::new(columns)?)
}
