//! Summary statistics (`describe`).
//!
//! Produces one row per statistic and one column per input column, preceded
//! by a `statistic` label column. Non-numeric columns only report `count`.

use tandem_core::schema::{DataType, Field, Schema};
use tandem_core::types::{Column, Scalar, Table};

use crate::error::Result;

pub const STATISTIC_COLUMN: &str = "statistic";
pub const STATISTICS: [&str; 8] = ["count", "mean", "std", "min", "25%", "50%", "75%", "max"];

/// Output schema of `describe` over `input`.
pub fn describe_schema(input: &Schema) -> Schema {
    let mut fields = vec![Field::new(STATISTIC_COLUMN, DataType::Utf8, false)];
    fields.extend(
        input
            .fields
            .iter()
            .map(|f| Field::new(f.name.clone(), DataType::Float64, true)),
    );
    Schema::new(fields)
}

pub fn describe(table: &Table) -> Result<Table> {
    let mut columns = vec![Column::new(
        STATISTIC_COLUMN,
        STATISTICS.iter().map(|s| Scalar::from(*s)).collect(),
    )];
    for col in &table.columns {
        columns.push(Column::new(col.name.clone(), column_stats(&col.values)));
    }
    Ok(Table::new(columns)?)
}

fn column_stats(values: &[Scalar]) -> Vec<Scalar> {
    let count = values.iter().filter(|v| !v.is_null()).count();
    let mut nums: Vec<f64> = values.iter().filter_map(Scalar::as_f64).collect();
    let numeric = nums.len() == count && count > 0;

    let mut out = vec![Scalar::F64(count as f64)];
    if !numeric {
        out.extend(std::iter::repeat(Scalar::Null).take(STATISTICS.len() - 1));
        return out;
    }

    nums.sort_by(|a, b| a.total_cmp(b));
    let n = nums.len() as f64;
    let mean = nums.iter().sum::<f64>() / n;
    // Sample standard deviation; undefined for a single value.
    let std = if nums.len() > 1 {
        Scalar::F64((nums.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt())
    } else {
        Scalar::Null
    };

    out.push(Scalar::F64(mean));
    out.push(std);
    out.push(Scalar::F64(nums[0]));
    for q in [0.25, 0.5, 0.75] {
        out.push(Scalar::F64(quantile(&nums, q)));
    }
    out.push(Scalar::F64(nums[nums.len() - 1]));
    out
}

/// Linear interpolation between closest ranks over sorted input.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}
