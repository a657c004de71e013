//! SQLite connection wrapper

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use regex::Regex;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::ValueRef;
use rusqlite::{Connection as RusqliteConnection, OpenFlags, params_from_iter};
use tabula_core::{ColumnInfo, ColumnType, Result, TabulaError, Value};

/// Result of running one query against a handle
#[derive(Debug, Clone)]
pub struct QueryOutput {
    /// Column names in projection order
    pub columns: Vec<String>,
    /// Declared types per column (empty string when the engine reports none)
    pub declared_types: Vec<String>,
    /// Row data aligned with `columns`
    pub rows: Vec<Vec<Value>>,
}

impl QueryOutput {
    /// First value of the first row, if any
    pub fn scalar(&self) -> Option<&Value> {
        self.rows.first().and_then(|r| r.first())
    }
}

/// A single live SQLite handle.
///
/// Opened read-only; Tabula never mutates the databases it serves. The
/// inner connection is behind a mutex so one handle can be shared by
/// concurrent requests for the same database path.
#[derive(Debug)]
pub struct SqliteHandle {
    conn: Arc<Mutex<RusqliteConnection>>,
    path: PathBuf,
}

impl SqliteHandle {
    /// Open a SQLite database file.
    ///
    /// Fails with `NotFound` if the file does not exist. A transient
    /// busy/locked error from the engine is retried once before being
    /// surfaced.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(TabulaError::NotFound(format!(
                "Database file does not exist: {}",
                path.display()
            )));
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = match RusqliteConnection::open_with_flags(path, flags) {
            Ok(conn) => conn,
            Err(e) if is_transient(&e) => {
                tracing::warn!(path = %path.display(), error = %e, "open hit a transient lock, retrying once");
                RusqliteConnection::open_with_flags(path, flags).map_err(|e| open_error(path, e))?
            }
            Err(rusqlite::Error::SqliteFailure(code, _))
                if code.code == rusqlite::ErrorCode::CannotOpen =>
            {
                // File vanished between the existence check and the open.
                return Err(TabulaError::NotFound(format!(
                    "Database file could not be opened: {}",
                    path.display()
                )));
            }
            Err(e) => return Err(open_error(path, e)),
        };

        register_regexp(&conn)
            .map_err(|e| TabulaError::Connection(format!("Failed to register REGEXP: {}", e)))?;

        tracing::info!(path = %path.display(), "SQLite database opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: path.to_path_buf(),
        })
    }

    /// Path of the underlying database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run a parameterized query and collect all rows.
    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    pub fn query(&self, sql: &str, params: &[Value]) -> Result<QueryOutput> {
        let conn = self.conn.lock();
        let rusqlite_params = values_to_rusqlite(params);

        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| TabulaError::Execution(format!("Failed to prepare query: {}", e)))?;

        let column_count = stmt.column_count();
        let mut columns: Vec<String> = Vec::with_capacity(column_count);
        let mut declared_types: Vec<String> = Vec::with_capacity(column_count);
        for col in stmt.columns().iter() {
            columns.push(col.name().to_string());
            declared_types.push(col.decl_type().unwrap_or("").to_string());
        }

        let mut rows = Vec::new();
        let mut query_rows = stmt
            .query(params_from_iter(rusqlite_params.iter()))
            .map_err(|e| TabulaError::Execution(format!("Failed to execute query: {}", e)))?;

        while let Some(row) = query_rows
            .next()
            .map_err(|e| TabulaError::Execution(format!("Failed to fetch row: {}", e)))?
        {
            let mut values = Vec::with_capacity(column_count);
            for i in 0..column_count {
                values.push(rusqlite_to_value(row, i)?);
            }
            rows.push(values);
        }

        tracing::debug!(row_count = rows.len(), "query executed");
        Ok(QueryOutput {
            columns,
            declared_types,
            rows,
        })
    }

    /// Run a query expected to produce exactly one integer (COUNT-style).
    pub fn query_scalar_i64(&self, sql: &str, params: &[Value]) -> Result<i64> {
        let output = self.query(sql, params)?;
        output
            .scalar()
            .and_then(|v| v.as_i64())
            .ok_or_else(|| TabulaError::Execution("Expected a scalar integer result".into()))
    }
}

fn open_error(path: &Path, e: rusqlite::Error) -> TabulaError {
    TabulaError::Connection(format!(
        "Failed to open SQLite database at '{}': {}",
        path.display(),
        e
    ))
}

fn is_transient(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(code, _)
            if code.code == rusqlite::ErrorCode::DatabaseBusy
                || code.code == rusqlite::ErrorCode::DatabaseLocked
    )
}

/// Register `REGEXP` so compiled plans can use native regular-expression
/// predicates. The compiled pattern is cached on the statement via the
/// auxdata mechanism, so repeated rows don't recompile it.
fn register_regexp(conn: &RusqliteConnection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "regexp",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        move |ctx| {
            let regexp: Arc<Regex> = ctx.get_or_create_aux(
                0,
                |vr| -> std::result::Result<_, Box<dyn std::error::Error + Send + Sync + 'static>> {
                    Ok(Regex::new(vr.as_str()?)?)
                },
            )?;
            let matched = match ctx.get_raw(1) {
                ValueRef::Null => false,
                ValueRef::Text(t) => regexp.is_match(&String::from_utf8_lossy(t)),
                other => {
                    // Numeric operands are matched against their text form,
                    // mirroring SQLite's own coercion for LIKE.
                    let text = match other {
                        ValueRef::Integer(i) => i.to_string(),
                        ValueRef::Real(f) => f.to_string(),
                        _ => return Ok(false),
                    };
                    regexp.is_match(&text)
                }
            };
            Ok(matched)
        },
    )
}

/// Convert Tabula values to rusqlite bind parameters
fn values_to_rusqlite(values: &[Value]) -> Vec<rusqlite::types::Value> {
    values
        .iter()
        .map(|v| match v {
            Value::Null => rusqlite::types::Value::Null,
            Value::Integer(i) => rusqlite::types::Value::Integer(*i),
            Value::Real(f) => rusqlite::types::Value::Real(*f),
            Value::Text(s) => rusqlite::types::Value::Text(s.clone()),
            Value::Blob(b) => rusqlite::types::Value::Blob(b.clone()),
        })
        .collect()
}

/// Convert a rusqlite row value to a Tabula value
fn rusqlite_to_value(row: &rusqlite::Row, idx: usize) -> Result<Value> {
    let value_ref = row
        .get_ref(idx)
        .map_err(|e| TabulaError::Execution(e.to_string()))?;

    let value = match value_ref {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Real(f),
        ValueRef::Text(s) => Value::Text(String::from_utf8_lossy(s).to_string()),
        ValueRef::Blob(b) => {
            // BLOB columns sometimes hold text stored without a declared
            // type; decode as UTF-8 when possible.
            match std::str::from_utf8(b) {
                Ok(s) => Value::Text(s.to_string()),
                Err(_) => Value::Blob(b.to_vec()),
            }
        }
    };

    Ok(value)
}

/// Build a `ColumnInfo` from a `pragma_table_info` row
pub(crate) fn column_info_from_pragma(
    name: String,
    declared_type: String,
    notnull: bool,
    default_value: Option<String>,
    pk: usize,
) -> ColumnInfo {
    let column_type = ColumnType::from_declared(&declared_type);
    ColumnInfo {
        name,
        declared_type,
        column_type,
        notnull,
        pk,
        default_value,
    }
}
