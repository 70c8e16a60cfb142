//! File readers producing in-memory `Table`s.
//!
//! Column types are inferred from the values: integers, then floats, then
//! booleans, falling back to text. Empty fields are nulls.

pub mod csv;
pub mod json;

pub use self::csv::read_csv;
pub use self::json::read_json;
