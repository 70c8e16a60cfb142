//! The SQLite connection wrapper.

use std::path::{Path, PathBuf};

use rusqlite::{params_from_iter, Connection};
use serde::Serialize;
use tracing::{debug, trace};

use tandem_core::id::Generation;
use tandem_core::schema::Schema;
use tandem_core::types::{Column, Table};
use tandem_sql::ddl;

use crate::convert::{from_sql, to_sql};
use crate::error::{Result, StoreError};
use crate::functions;

/// Work counters, used to observe that repeated computation is not repeated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    /// `CREATE TABLE ... AS` statements issued.
    pub tables_created: u64,
    /// In-memory tables bulk loaded.
    pub tables_loaded: u64,
    /// Rows read back into memory.
    pub rows_read: u64,
}

pub struct RelationalStore {
    conn: Option<Connection>,
    path: PathBuf,
    /// The file was created by us and is removed on close.
    owned: bool,
    generation: Generation,
    stats: StoreStats,
}

impl std::fmt::Debug for RelationalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationalStore")
            .field("path", &self.path)
            .field("open", &self.conn.is_some())
            .field("generation", &self.generation)
            .finish()
    }
}

fn temp_path() -> PathBuf {
    std::env::temp_dir().join(format!("tandem-{}.db", uuid::Uuid::new_v4().simple()))
}

fn connect(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    functions::register(&conn)?;
    Ok(conn)
}

impl RelationalStore {
    /// Open `path`, or a fresh temp file (deleted on close) when `None`.
    pub fn open(path: Option<&Path>) -> Result<Self> {
        let (path, owned) = match path {
            Some(p) => (p.to_path_buf(), false),
            None => (temp_path(), true),
        };
        let conn = connect(&path)?;
        debug!(path = %path.display(), owned, "opened relational store");
        Ok(Self {
            conn: Some(conn),
            path,
            owned,
            generation: Generation::new(0),
            stats: StoreStats::default(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Identifies the current connection; bumped whenever the file changes.
    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn stats(&self) -> StoreStats {
        self.stats
    }

    fn conn(&self) -> Result<&Connection> {
        self.conn.as_ref().ok_or(StoreError::Closed)
    }

    fn conn_mut(&mut self) -> Result<&mut Connection> {
        self.conn.as_mut().ok_or(StoreError::Closed)
    }

    fn release(&mut self, delete: bool) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            conn.close().map_err(|(_, e)| StoreError::Sqlite(e))?;
        }
        if delete && self.path.exists() {
            std::fs::remove_file(&self.path)?;
            debug!(path = %self.path.display(), "deleted database file");
        }
        Ok(())
    }

    /// Switch to another database file. Every table of the old file is
    /// unreachable afterwards, so the generation changes.
    pub fn set_path(&mut self, path: &Path, delete_old: bool) -> Result<()> {
        let conn = connect(path)?;
        self.release(delete_old || self.owned)?;
        self.conn = Some(conn);
        self.path = path.to_path_buf();
        self.owned = false;
        self.generation = self.generation.next();
        debug!(path = %path.display(), generation = self.generation.get(), "switched database file");
        Ok(())
    }

    /// Close the connection. Temp files created by the store are always
    /// removed; user-supplied files only when `delete` is set.
    pub fn close(&mut self, delete: bool) -> Result<()> {
        let delete = delete || self.owned;
        self.release(delete)?;
        self.owned = false;
        self.generation = self.generation.next();
        Ok(())
    }

    /// `CREATE TABLE name AS query`, replacing any previous table of that name.
    pub fn create_table_as(&mut self, name: &str, query: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(&ddl::drop_table_if_exists(name), [])?;
        let sql = ddl::create_table_as(name, query);
        trace!(%sql, "create table");
        conn.execute(&sql, [])?;
        self.stats.tables_created += 1;
        Ok(())
    }

    /// Bulk load `table` under `name` with column types from `schema`.
    pub fn bulk_load(&mut self, name: &str, table: &Table, schema: &Schema) -> Result<()> {
        let rows = table.num_rows();
        let conn = self.conn_mut()?;
        conn.execute(&ddl::drop_table_if_exists(name), [])?;
        conn.execute(&ddl::create_table(name, schema), [])?;

        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&ddl::insert_row(name, table.num_columns()))?;
            for r in 0..rows {
                stmt.execute(params_from_iter(
                    table.columns.iter().map(|c| to_sql(&c.values[r])),
                ))?;
            }
        }
        tx.commit()?;

        self.stats.tables_loaded += 1;
        debug!(table = name, rows, "bulk loaded");
        Ok(())
    }

    /// Read `columns` of table `name` in insertion order.
    pub fn read_table<S: AsRef<str>>(&mut self, name: &str, columns: &[S]) -> Result<Table> {
        let table = self.query(&ddl::select_all(name, columns))?;
        self.stats.rows_read += table.num_rows() as u64;
        Ok(table)
    }

    /// Run an arbitrary query and collect the result.
    pub fn query(&self, sql: &str) -> Result<Table> {
        trace!(%sql, "query");
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
        let mut values: Vec<Vec<_>> = vec![Vec::new(); names.len()];

        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            for (idx, col) in values.iter_mut().enumerate() {
                col.push(from_sql(row.get_ref(idx)?));
            }
        }

        let columns = names
            .into_iter()
            .zip(values)
            .map(|(name, values)| Column::new(name, values))
            .collect();
        Ok(Table::new(columns)?)
    }

    pub fn row_count(&self, name: &str) -> Result<u64> {
        let n: i64 = self
            .conn()?
            .query_row(&ddl::count_rows(name), [], |r| r.get(0))?;
        Ok(n.max(0) as u64)
    }

    /// Size of the database in bytes (pages × page size).
    pub fn storage_size(&self) -> Result<u64> {
        let conn = self.conn()?;
        let pages: i64 = conn.query_row("PRAGMA page_count", [], |r| r.get(0))?;
        let page_size: i64 = conn.query_row("PRAGMA page_size", [], |r| r.get(0))?;
        Ok((pages.max(0) as u64).saturating_mul(page_size.max(0) as u64))
    }
}

impl Drop for RelationalStore {
    fn drop(&mut self) {
        let delete = self.owned;
        if let Err(e) = self.release(delete) {
            debug!(error = %e, "failed to release relational store");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_core::schema::{DataType, Field};
    use tandem_core::types::Scalar;

    fn sample() -> (Table, Schema) {
        let table = Table::from_rows(
            &["k", "flag", "s"],
            vec![
                vec![Scalar::I64(2), Scalar::Bool(true), Scalar::from("b")],
                vec![Scalar::I64(1), Scalar::Bool(false), Scalar::Null],
            ],
        )
        .unwrap();
        let schema = Schema::new(vec![
            Field::new("k", DataType::Int64, false),
            Field::new("flag", DataType::Boolean, false),
            Field::new("s", DataType::Utf8, true),
        ]);
        (table, schema)
    }

    #[test]
    fn test_load_query_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = RelationalStore::open(Some(&dir.path().join("t.db"))).unwrap();
        let (table, schema) = sample();
        store.bulk_load("src", &table, &schema).unwrap();
        store
            .create_table_as("out", "SELECT \"k\" * 10 AS \"k\" FROM \"src\" ORDER BY \"k\"")
            .unwrap();
        assert_eq!(store.row_count("out").unwrap(), 2);

        let back = store.read_table("out", &["k"]).unwrap();
        assert_eq!(back.column("k").unwrap().values, vec![Scalar::I64(10), Scalar::I64(20)]);

        let src = store.read_table("src", &["flag", "s"]).unwrap();
        assert_eq!(src.column("flag").unwrap().values[0], Scalar::I64(1));
        assert_eq!(src.column("s").unwrap().values[1], Scalar::Null);

        assert_eq!(
            store.stats(),
            StoreStats {
                tables_created: 1,
                tables_loaded: 1,
                rows_read: 4
            }
        );
        assert!(store.storage_size().unwrap() > 0);
    }

    #[test]
    fn test_temp_file_removed_on_close() {
        let mut store = RelationalStore::open(None).unwrap();
        let path = store.path().to_path_buf();
        let (table, schema) = sample();
        store.bulk_load("src", &table, &schema).unwrap();
        assert!(path.exists());
        store.close(false).unwrap();
        assert!(!path.exists());
        assert!(matches!(store.row_count("src"), Err(StoreError::Closed)));
    }

    #[test]
    fn test_switching_files_bumps_generation() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("a.db");
        let second = dir.path().join("b.db");
        let mut store = RelationalStore::open(Some(&first)).unwrap();
        let (table, schema) = sample();
        store.bulk_load("src", &table, &schema).unwrap();
        let before = store.generation();

        store.set_path(&second, true).unwrap();
        assert_ne!(store.generation(), before);
        assert!(!first.exists());
        // The new file starts empty.
        assert!(matches!(store.row_count("src"), Err(StoreError::Sqlite(_))));

        store.close(false).unwrap();
        assert!(second.exists());
    }
}
