//! Scalar <-> SQLite value conversion.
//!
//! SQLite has no boolean or NaN: booleans are stored as 0/1 and NaN as NULL.
//! Read-back therefore yields integers where the schema says boolean; the
//! engine restores the declared types with `Scalar::coerce`.

use rusqlite::types::{Value, ValueRef};

use tandem_core::types::Scalar;

pub fn to_sql(v: &Scalar) -> Value {
    match v {
        Scalar::Null => Value::Null,
        Scalar::Bool(b) => Value::Integer(*b as i64),
        Scalar::I64(i) => Value::Integer(*i),
        Scalar::F64(f) if f.is_nan() => Value::Null,
        Scalar::F64(f) => Value::Real(*f),
        Scalar::Str(s) => Value::Text(s.clone()),
        Scalar::Bin(b) => Value::Blob(b.clone()),
    }
}

pub fn from_sql(v: ValueRef<'_>) -> Scalar {
    match v {
        ValueRef::Null => Scalar::Null,
        ValueRef::Integer(i) => Scalar::I64(i),
        ValueRef::Real(f) => Scalar::F64(f),
        ValueRef::Text(t) => Scalar::Str(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Scalar::Bin(b.to_vec()),
    }
}
