//! Schema introspection for SQLite databases
//!
//! Resolves the `TableSchema` consumed by request validation and the
//! query compiler, straight from `sqlite_master` and the pragma
//! table-valued functions.

use tabula_core::{IndexInfo, Result, TableInfo, TableSchema, TabulaError, Value};

use crate::connection::{SqliteHandle, column_info_from_pragma};

impl SqliteHandle {
    /// Whether a user table (or view) with this name exists
    pub fn table_exists(&self, table: &str) -> Result<bool> {
        let count = self.query_scalar_i64(
            "SELECT COUNT(*) FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?",
            &[Value::Text(table.to_string())],
        )?;
        Ok(count > 0)
    }

    /// Resolve the full schema for one table.
    ///
    /// Fails with `NotFound` if the table does not exist.
    #[tracing::instrument(skip(self))]
    pub fn table_schema(&self, table: &str) -> Result<TableSchema> {
        if !self.table_exists(table)? {
            return Err(TabulaError::NotFound(format!("Table '{}' not found", table)));
        }

        let output = self.query(
            "SELECT name, type, [notnull], dflt_value, pk FROM pragma_table_info(?)",
            &[Value::Text(table.to_string())],
        )?;

        let mut columns = Vec::with_capacity(output.rows.len());
        for row in &output.rows {
            let name = row[0].as_str().unwrap_or("").to_string();
            let declared_type = row[1].as_str().unwrap_or("").to_string();
            let notnull = row[2].as_i64().unwrap_or(0) != 0;
            let default_value = match &row[3] {
                Value::Null => None,
                v => Some(v.to_string()),
            };
            let pk = row[4].as_i64().unwrap_or(0) as usize;
            columns.push(column_info_from_pragma(
                name,
                declared_type,
                notnull,
                default_value,
                pk,
            ));
        }

        let indexes = self.table_indexes(table)?;
        let fts_table = self.fts_table_for(table)?;

        tracing::debug!(
            column_count = columns.len(),
            index_count = indexes.len(),
            fts = fts_table.is_some(),
            "table schema resolved"
        );
        Ok(TableSchema {
            table: table.to_string(),
            columns,
            indexes,
            fts_table,
        })
    }

    /// Indexes declared on a table, with their DDL when present
    fn table_indexes(&self, table: &str) -> Result<Vec<IndexInfo>> {
        let list = self.query(
            "SELECT il.name, il.[unique], m.sql
             FROM pragma_index_list(?) il
             LEFT JOIN sqlite_master m ON m.name = il.name",
            &[Value::Text(table.to_string())],
        )?;

        let mut indexes = Vec::new();
        for row in &list.rows {
            let name = match row[0].as_str() {
                Some(s) => s.to_string(),
                None => continue,
            };
            let is_unique = row[1].as_i64().unwrap_or(0) == 1;
            let definition = row[2].as_str().map(|s| s.to_string());

            let cols = self.query(
                "SELECT name FROM pragma_index_info(?)",
                &[Value::Text(name.clone())],
            )?;
            let columns = cols
                .rows
                .iter()
                .filter_map(|r| r[0].as_str().map(|s| s.to_string()))
                .collect();

            indexes.push(IndexInfo {
                name,
                definition,
                columns,
                is_unique,
            });
        }

        Ok(indexes)
    }

    /// Find a full-text index shadow table covering `table`, if any.
    ///
    /// Recognizes FTS5 virtual tables that either declare
    /// `content='<table>'` or follow the `<table>_fts` naming convention.
    pub fn fts_table_for(&self, table: &str) -> Result<Option<String>> {
        let output = self.query(
            "SELECT name, sql FROM sqlite_master
             WHERE type = 'table' AND sql LIKE '%USING fts%'",
            &[],
        )?;

        let conventional = format!("{}_fts", table);
        for row in &output.rows {
            let name = row[0].as_str().unwrap_or("");
            let sql = row[1].as_str().unwrap_or("").to_lowercase();
            let content_single = format!("content='{}'", table.to_lowercase());
            let content_double = format!("content=\"{}\"", table.to_lowercase());
            if name == conventional
                || sql.contains(&content_single)
                || sql.contains(&content_double)
            {
                return Ok(Some(name.to_string()));
            }
        }
        Ok(None)
    }

    /// List user tables with their row counts, excluding SQLite internals.
    #[tracing::instrument(skip(self))]
    pub fn list_tables(&self) -> Result<Vec<TableInfo>> {
        let output = self.query(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
            &[],
        )?;

        let mut tables = Vec::new();
        for row in &output.rows {
            let name = row[0].as_str().unwrap_or("").to_string();
            let row_count = self
                .query_scalar_i64(&format!("SELECT COUNT(*) FROM {}", quote_ident(&name)), &[])
                .ok();
            tables.push(TableInfo { name, row_count });
        }

        tracing::debug!(table_count = tables.len(), "tables listed");
        Ok(tables)
    }
}

/// Quote an identifier for embedding in SQL text.
///
/// Values always go through bind parameters; quoting is only ever used
/// for identifiers, which cannot be parameterized.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tabula_core::ColumnType;
    use tempfile::TempDir;

    fn fixture(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("library.db");
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE books (
                 id INTEGER PRIMARY KEY,
                 title TEXT NOT NULL,
                 pages INTEGER,
                 rating REAL DEFAULT 0.0
             );
             CREATE INDEX idx_books_title ON books (title);
             CREATE VIRTUAL TABLE books_fts USING fts5(title, content='books');
             INSERT INTO books (title, pages) VALUES ('Dune', 412), ('Solaris', 204);",
        )
        .unwrap();
        path
    }

    #[test]
    fn schema_resolves_columns_and_types() {
        let dir = TempDir::new().unwrap();
        let handle = SqliteHandle::open(&fixture(&dir)).unwrap();
        let schema = handle.table_schema("books").unwrap();

        assert_eq!(schema.table, "books");
        assert_eq!(schema.column_names(), vec!["id", "title", "pages", "rating"]);

        let title = schema.column("title").unwrap();
        assert_eq!(title.column_type, ColumnType::Text);
        assert!(title.notnull);

        let rating = schema.column("rating").unwrap();
        assert_eq!(rating.column_type, ColumnType::Real);
        assert_eq!(rating.default_value.as_deref(), Some("0.0"));

        assert_eq!(schema.primary_key(), vec!["id"]);
    }

    #[test]
    fn indexes_are_listed() {
        let dir = TempDir::new().unwrap();
        let handle = SqliteHandle::open(&fixture(&dir)).unwrap();
        let schema = handle.table_schema("books").unwrap();

        let idx = schema
            .indexes
            .iter()
            .find(|i| i.name == "idx_books_title")
            .unwrap();
        assert_eq!(idx.columns, vec!["title"]);
        assert!(!idx.is_unique);
        assert!(idx.definition.as_deref().unwrap_or("").contains("idx_books_title"));
    }

    #[test]
    fn fts_shadow_table_is_detected() {
        let dir = TempDir::new().unwrap();
        let handle = SqliteHandle::open(&fixture(&dir)).unwrap();
        let schema = handle.table_schema("books").unwrap();
        assert_eq!(schema.fts_table.as_deref(), Some("books_fts"));
    }

    #[test]
    fn missing_table_is_not_found() {
        let dir = TempDir::new().unwrap();
        let handle = SqliteHandle::open(&fixture(&dir)).unwrap();
        let err = handle.table_schema("nope").unwrap_err();
        assert!(matches!(err, TabulaError::NotFound(_)));
    }

    #[test]
    fn list_tables_excludes_internals() {
        let dir = TempDir::new().unwrap();
        let handle = SqliteHandle::open(&fixture(&dir)).unwrap();
        let tables = handle.list_tables().unwrap();

        let books = tables.iter().find(|t| t.name == "books").unwrap();
        assert_eq!(books.row_count, Some(2));
        assert!(tables.iter().all(|t| !t.name.starts_with("sqlite_")));
    }

    #[test]
    fn quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("plain"), "\"plain\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
