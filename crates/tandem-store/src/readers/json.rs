//! JSON reader for an array of records (`[{"a": 1}, ...]`).

use std::io::Read;
use std::path::Path;

use serde_json::Value as Json;

use tandem_core::schema::DataType;
use tandem_core::types::{Column, Scalar, Table};

use crate::error::{Result, StoreError};

fn to_scalar(v: &Json) -> Scalar {
    match v {
        Json::Null => Scalar::Null,
        Json::Bool(b) => Scalar::Bool(*b),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Scalar::I64(i),
            None => n.as_f64().map(Scalar::F64).unwrap_or(Scalar::Null),
        },
        Json::String(s) => Scalar::Str(s.clone()),
        // Nested values are kept as their JSON text.
        other => Scalar::Str(other.to_string()),
    }
}

pub fn read_json_from<R: Read>(reader: R) -> Result<Table> {
    let doc: Json = serde_json::from_reader(reader)?;
    let records = doc
        .as_array()
        .ok_or_else(|| StoreError::Format("expected a JSON array of records".into()))?;

    // Columns in order of first appearance across records.
    let mut names: Vec<String> = Vec::new();
    for rec in records {
        let obj = rec
            .as_object()
            .ok_or_else(|| StoreError::Format("every record must be a JSON object".into()))?;
        for key in obj.keys() {
            if !names.contains(key) {
                names.push(key.clone());
            }
        }
    }

    let columns = names
        .into_iter()
        .map(|name| {
            let values: Vec<Scalar> = records
                .iter()
                .map(|rec| rec.get(&name).map(to_scalar).unwrap_or(Scalar::Null))
                .collect();
            let target = values
                .iter()
                .map(Scalar::data_type)
                .fold(DataType::Null, DataType::unify);
            let values = match target {
                DataType::Int64 | DataType::Float64 => {
                    values.into_iter().map(|v| v.coerce(target)).collect()
                }
                DataType::Utf8 => values
                    .into_iter()
                    .map(|v| match v {
                        Scalar::Null | Scalar::Str(_) => v,
                        other => Scalar::Str(other.to_string()),
                    })
                    .collect(),
                _ => values,
            };
            Column::new(name, values)
        })
        .collect();
    Ok(Table::new(columns)?)
}

pub fn read_json(path: impl AsRef<Path>) -> Result<Table> {
    let file = std::fs::File::open(path)?;
    read_json_from(std::io::BufReader::new(file))
}
