//! SQL functions registered on every connection.
//!
//! SQLite has no product aggregate, so `product(x)` is provided here. It skips
//! nulls, yields 1 over no values, and switches to floating point once an
//! input is real or the integer product overflows (the in-memory engine does
//! the same).

use rusqlite::functions::{Aggregate, Context, FunctionFlags};
use rusqlite::types::{Value, ValueRef};
use rusqlite::Connection;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Acc {
    Int(i64),
    Float(f64),
}

impl Acc {
    fn mul_int(self, v: i64) -> Acc {
        match self {
            Acc::Int(a) => match a.checked_mul(v) {
                Some(p) => Acc::Int(p),
                None => Acc::Float(a as f64 * v as f64),
            },
            Acc::Float(a) => Acc::Float(a * v as f64),
        }
    }

    fn mul_float(self, v: f64) -> Acc {
        match self {
            Acc::Int(a) => Acc::Float(a as f64 * v),
            Acc::Float(a) => Acc::Float(a * v),
        }
    }

    fn into_value(self) -> Value {
        match self {
            Acc::Int(i) => Value::Integer(i),
            Acc::Float(f) => Value::Real(f),
        }
    }
}

struct Product;

impl Aggregate<Acc, Value> for Product {
    fn init(&self, _ctx: &mut Context<'_>) -> rusqlite::Result<Acc> {
        Ok(Acc::Int(1))
    }

    fn step(&self, ctx: &mut Context<'_>, acc: &mut Acc) -> rusqlite::Result<()> {
        *acc = match ctx.get_raw(0) {
            ValueRef::Null => return Ok(()),
            ValueRef::Integer(i) => acc.mul_int(i),
            ValueRef::Real(f) => acc.mul_float(f),
            ValueRef::Text(_) | ValueRef::Blob(_) => {
                return Err(rusqlite::Error::UserFunctionError(
                    "product() is only defined for numeric values".into(),
                ))
            }
        };
        Ok(())
    }

    fn finalize(&self, _ctx: &mut Context<'_>, acc: Option<Acc>) -> rusqlite::Result<Value> {
        Ok(acc.unwrap_or(Acc::Int(1)).into_value())
    }
}

pub fn register(conn: &Connection) -> Result<()> {
    conn.create_aggregate_function(
        "product",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        Product,
    )?;
    Ok(())
}
