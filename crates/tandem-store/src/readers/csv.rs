//! CSV reader with per-field type inference.

use std::io::Read;
use std::path::Path;

use tandem_core::schema::DataType;
use tandem_core::types::{Column, Scalar, Table};

use crate::error::Result;

fn parse_field(raw: &str) -> Scalar {
    if raw.is_empty() {
        return Scalar::Null;
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Scalar::I64(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        return Scalar::F64(f);
    }
    match raw {
        "true" | "True" | "TRUE" => Scalar::Bool(true),
        "false" | "False" | "FALSE" => Scalar::Bool(false),
        _ => Scalar::Str(raw.to_string()),
    }
}

/// Bring a column to the type all of its values agree on. Integer columns
/// with a float become float, booleans mixed with numbers become numbers,
/// anything mixed with text becomes text.
fn unify_column(values: Vec<Scalar>, raw: &[String]) -> Vec<Scalar> {
    let target = values
        .iter()
        .map(Scalar::data_type)
        .fold(DataType::Null, DataType::unify);
    match target {
        DataType::Utf8 => values
            .into_iter()
            .zip(raw)
            .map(|(v, r)| if v.is_null() { v } else { Scalar::Str(r.clone()) })
            .collect(),
        DataType::Int64 | DataType::Float64 => values.into_iter().map(|v| v.coerce(target)).collect(),
        _ => values,
    }
}

pub fn read_csv_from<R: Read>(reader: R) -> Result<Table> {
    let mut rdr = ::csv::ReaderBuilder::new().has_headers(true).from_reader(reader);
    let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.to_string()).collect();

    let mut raw: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
    for record in rdr.records() {
        let record = record?;
        for (idx, col) in raw.iter_mut().enumerate() {
            col.push(record.get(idx).unwrap_or("").to_string());
        }
    }

    let columns = headers
        .into_iter()
        .zip(raw)
        .map(|(name, raw)| {
            let parsed: Vec<Scalar> = raw.iter().map(|r| parse_field(r)).collect();
            Column::new(name, unify_column(parsed, &raw))
        })
        .collect();
    Ok(Table::new(columns)?)
}

pub fn read_csv(path: impl AsRef<Path>) -> Result<Table> {
    let file = std::fs::File::open(path)?;
    read_csv_from(std::io::BufReader::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infers_column_types() {
        let data = "id,score,name,ok\n1,2.5,a,true\n2,3,,false\n3,,c,true\n";
        let t = read_csv_from(data.as_bytes()).unwrap();
        assert_eq!(t.column_names(), vec!["id", "score", "name", "ok"]);
        assert_eq!(t.column("id").unwrap().values[2], Scalar::I64(3));
        assert_eq!(
            t.column("score").unwrap().values,
            vec![Scalar::F64(2.5), Scalar::F64(3.0), Scalar::Null]
        );
        assert_eq!(t.column("name").unwrap().values[1], Scalar::Null);
        assert_eq!(t.column("ok").unwrap().values[0], Scalar::Bool(true));
    }

    #[test]
    fn test_mixed_column_is_text() {
        let t = read_csv_from("v\n1\nx\n".as_bytes()).unwrap();
        assert_eq!(
            t.column("v").unwrap().values,
            vec![Scalar::from("1"), Scalar::from("x")]
        );
    }
}
