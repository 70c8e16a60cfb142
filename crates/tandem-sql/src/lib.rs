#![forbid(unsafe_code)]
//! tandem-sql: turns graph nodes into SQLite statements.
//!
//! Rendering is pure string generation over the graph; nothing here touches
//! a connection. The dialect is SQLite's: double-quoted identifiers, `WITH`
//! common table expressions, integer booleans.

pub mod ddl;
pub mod quote;
pub mod render;

pub use render::{render, render_fragment};
