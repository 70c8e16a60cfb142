//! Statements used by the relational store around compiled queries.

use tandem_core::schema::Schema;

use crate::quote::{column_type, ident};

pub fn drop_table_if_exists(name: &str) -> String {
    format!("DROP TABLE IF EXISTS {}", ident(name))
}

pub fn create_table_as(name: &str, query: &str) -> String {
    format!("CREATE TABLE {} AS {}", ident(name), query)
}

/// `CREATE TABLE` with declared types, for bulk loading.
pub fn create_table(name: &str, schema: &Schema) -> String {
    let cols: Vec<String> = schema
        .fields
        .iter()
        .map(|f| match column_type(f.data_type) {
            "" => ident(&f.name),
            ty => format!("{} {}", ident(&f.name), ty),
        })
        .collect();
    format!("CREATE TABLE {} ({})", ident(name), cols.join(", "))
}

/// Parameterized insert of one row.
pub fn insert_row(name: &str, columns: usize) -> String {
    let params = vec!["?"; columns].join(", ");
    format!("INSERT INTO {} VALUES ({})", ident(name), params)
}

/// Full read-back in insertion order.
pub fn select_all<S: AsRef<str>>(name: &str, columns: &[S]) -> String {
    let cols: Vec<String> = columns.iter().map(|c| ident(c.as_ref())).collect();
    format!("SELECT {} FROM {} ORDER BY rowid", cols.join(", "), ident(name))
}

pub fn count_rows(name: &str) -> String {
    format!("SELECT COUNT(*) FROM {}", ident(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_core::schema::{DataType, Field};

    #[test]
    fn test_create_table_declares_types() {
        let schema = Schema::new(vec![
            Field::new("a", DataType::Int64, false),
            Field::new("flag", DataType::Boolean, false),
            Field::new("n", DataType::Null, true),
        ]);
        assert_eq!(
            create_table("t", &schema),
            "CREATE TABLE \"t\" (\"a\" INTEGER, \"flag\" INTEGER, \"n\")"
        );
        assert_eq!(insert_row("t", 3), "INSERT INTO \"t\" VALUES (?, ?, ?)");
    }
}
