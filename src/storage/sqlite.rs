//! SQLite storage implementation

use rusqlite::backup::Progress;
use rusqlite::types::Value;
use rusqlite::{Connection, DatabaseName, OptionalExtension, ToSql};
use serde::Serialize;
use crate::{Error, Result};
use super::schema;

/// In-memory SQLite database owning the whole catalog
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Create a fresh in-memory database with the catalog schema applied
    pub fn create_empty() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Build a fresh in-memory database from a snapshot produced by [`serialize`].
    ///
    /// Fails with [`Error::CorruptSnapshot`] if the bytes are not a SQLite
    /// image, lack the catalog tables, or do not enforce the catalog's unique keys.
    ///
    /// [`serialize`]: SqliteStore::serialize
    pub fn reconstruct(bytes: &[u8]) -> Result<Self> {
        let staging = tempfile::NamedTempFile::new()?;
        std::fs::write(staging.path(), bytes)?;

        let mut conn = Connection::open_in_memory()?;
        conn.restore(DatabaseName::Main, staging.path(), None::<fn(Progress)>)
            .map_err(|e| Error::CorruptSnapshot(e.to_string()))?;

        let store = Self { conn };
        store.verify_snapshot()?;
        tracing::debug!("Reconstructed store from {} byte snapshot", bytes.len());
        Ok(store)
    }

    /// Initialize the database schema
    fn initialize_schema(&self) -> Result<()> {
        for stmt in schema::all_schema_statements() {
            self.conn.execute(stmt, [])?;
        }
        Ok(())
    }

    /// Check that a restored image is intact and carries the catalog schema
    fn verify_snapshot(&self) -> Result<()> {
        let corrupt = |e: rusqlite::Error| Error::CorruptSnapshot(e.to_string());

        let check: String = self
            .conn
            .query_row("PRAGMA quick_check", [], |row| row.get(0))
            .map_err(corrupt)?;
        if check != "ok" {
            return Err(Error::CorruptSnapshot(format!("integrity check failed: {}", check)));
        }

        for (table, columns) in schema::REQUIRED_COLUMNS {
            let mut stmt = self
                .conn
                .prepare("SELECT name FROM pragma_table_info(?1)")
                .map_err(corrupt)?;
            let present: Vec<String> = stmt
                .query_map([table], |row| row.get(0))
                .map_err(corrupt)?
                .collect::<rusqlite::Result<_>>()
                .map_err(corrupt)?;

            if present.is_empty() {
                return Err(Error::CorruptSnapshot(format!("missing table {}", table)));
            }
            if let Some(missing) = columns.iter().find(|c| !present.iter().any(|p| p == *c)) {
                return Err(Error::CorruptSnapshot(format!("table {} lacks column {}", table, missing)));
            }
        }

        for (table, key) in schema::REQUIRED_UNIQUE_KEYS {
            if !self.has_unique_key(table, key).map_err(corrupt)? {
                return Err(Error::CorruptSnapshot(format!(
                    "table {} does not enforce UNIQUE({})",
                    table,
                    key.join(", ")
                )));
            }
        }
        Ok(())
    }

    /// Whether `table` carries a full (non-partial) unique index over exactly `key`.
    ///
    /// Covers both inline `UNIQUE` clauses and separate `CREATE UNIQUE INDEX`.
    fn has_unique_key(&self, table: &str, key: &[&str]) -> rusqlite::Result<bool> {
        let mut indexes = self
            .conn
            .prepare(r#"SELECT name FROM pragma_index_list(?1) WHERE "unique" = 1 AND partial = 0"#)?;
        let names: Vec<String> = indexes
            .query_map([table], |row| row.get(0))?
            .collect::<rusqlite::Result<_>>()?;

        let mut info = self
            .conn
            .prepare("SELECT name FROM pragma_index_info(?1) ORDER BY seqno")?;
        for index in names {
            let mut columns: Vec<String> = info
                .query_map([&index], |row| row.get(0))?
                .collect::<rusqlite::Result<_>>()?;
            columns.sort();

            let mut wanted: Vec<&str> = key.to_vec();
            wanted.sort_unstable();
            if columns.iter().map(String::as_str).eq(wanted.iter().copied()) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Produce a complete, self-contained snapshot of the current contents
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let staging = tempfile::NamedTempFile::new()?;
        self.conn.backup(DatabaseName::Main, staging.path(), None)?;
        let bytes = std::fs::read(staging.path())?;
        tracing::debug!("Serialized store into {} bytes", bytes.len());
        Ok(bytes)
    }

    /// Statement executor over the live connection
    pub fn exec(&self) -> Executor<'_> {
        Executor { conn: &self.conn }
    }

    /// Run one statement with positional parameters.
    ///
    /// Returns every result row for reads and nothing for writes.
    pub fn execute(&self, sql: &str, params: &[&dyn ToSql]) -> Result<Vec<Vec<Value>>> {
        self.exec().execute(sql, params)
    }

    // ========== Transactions ==========

    /// Run `f` inside one transaction.
    ///
    /// Commits when `f` returns `Ok`. Any error rolls back every change `f` made.
    pub fn transaction<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&Executor<'_>) -> Result<T>,
    {
        let tx = self.conn.transaction()?;
        let value = f(&Executor { conn: &tx })?;
        tx.commit()?;
        Ok(value)
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<StoreStats> {
        let exec = self.exec();
        Ok(StoreStats {
            models: exec.count("SELECT COUNT(*) FROM car_models")?,
            parts: exec.count("SELECT COUNT(*) FROM car_parts")?,
            links: exec.count("SELECT COUNT(*) FROM car_part_models")?,
            primary_links: exec.count("SELECT COUNT(*) FROM car_part_models WHERE is_primary = 1")?,
        })
    }
}

/// Statement runner shared by the plain connection and open transactions
pub struct Executor<'c> {
    conn: &'c Connection,
}

impl Executor<'_> {
    /// Run one statement and collect its rows as dynamic values
    pub fn execute(&self, sql: &str, params: &[&dyn ToSql]) -> Result<Vec<Vec<Value>>> {
        let mut stmt = self.conn.prepare(sql)?;
        let width = stmt.column_count();
        let mut rows = stmt.query(params)?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(width);
            for idx in 0..width {
                values.push(row.get::<_, Value>(idx)?);
            }
            out.push(values);
        }
        Ok(out)
    }

    /// Run a read and map each row
    pub fn query_rows<T, F>(&self, sql: &str, params: &[&dyn ToSql], map: F) -> Result<Vec<T>>
    where
        F: FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
    {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let rows = stmt
            .query_map(params, map)?
            .collect::<rusqlite::Result<Vec<T>>>()?;
        Ok(rows)
    }

    /// Whether a read returns at least one row
    pub fn exists(&self, sql: &str, params: &[&dyn ToSql]) -> Result<bool> {
        let found = self
            .conn
            .query_row(sql, params, |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    /// Run a write and return the number of changed rows
    pub fn write(&self, sql: &str, params: &[&dyn ToSql]) -> Result<usize> {
        Ok(self.conn.execute(sql, params)?)
    }

    pub fn last_insert_rowid(&self) -> i64 {
        self.conn.last_insert_rowid()
    }

    fn count(&self, sql: &str) -> Result<usize> {
        let count: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

/// Database statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub models: usize,
    pub parts: usize,
    pub links: usize,
    pub primary_links: usize,
}

impl std::fmt::Display for StoreStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Catalog Statistics:")?;
        writeln!(f, "  Models: {}", self.models)?;
        writeln!(f, "  Parts: {}", self.parts)?;
        writeln!(f, "  Links: {}", self.links)?;
        writeln!(f, "  Primary links: {}", self.primary_links)
    }
}
