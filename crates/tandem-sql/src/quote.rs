//! Identifier and literal quoting.

use std::fmt::Write;

use tandem_core::schema::DataType;
use tandem_core::types::Scalar;

/// Double-quoted identifier with embedded quotes doubled.
pub fn ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `"table"."column"`
pub fn qualified(table: &str, column: &str) -> String {
    format!("{}.{}", ident(table), ident(column))
}

/// SQL literal for a scalar. Booleans become integers and NaN becomes NULL,
/// as SQLite would store them.
pub fn literal(value: &Scalar) -> String {
    match value {
        Scalar::Null => "NULL".to_string(),
        Scalar::Bool(b) => (if *b { "1" } else { "0" }).to_string(),
        Scalar::I64(i) => i.to_string(),
        Scalar::F64(f) if f.is_nan() => "NULL".to_string(),
        Scalar::F64(f) if f.is_infinite() => (if *f > 0.0 { "9e999" } else { "-9e999" }).to_string(),
        Scalar::F64(f) => format!("{:?}", f),
        Scalar::Str(s) => format!("'{}'", s.replace('\'', "''")),
        Scalar::Bin(bytes) => {
            let mut out = String::with_capacity(bytes.len() * 2 + 3);
            out.push_str("X'");
            for b in bytes {
                let _ = write!(out, "{:02X}", b);
            }
            out.push('\'');
            out
        }
    }
}

/// Declared column type used when creating tables from in-memory data.
pub fn column_type(dt: DataType) -> &'static str {
    match dt {
        DataType::Boolean | DataType::Int64 => "INTEGER",
        DataType::Float64 => "REAL",
        DataType::Utf8 => "TEXT",
        DataType::Binary => "BLOB",
        DataType::Null => "",
    }
}
