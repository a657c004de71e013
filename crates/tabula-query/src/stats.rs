//! Per-column statistics
//!
//! Summary statistics for one column, computed inside the engine so
//! only aggregates cross the boundary. Numeric columns get the full
//! set (mean, median, stddev); other columns report min/max by the
//! engine's collation plus counts and samples.

use serde::{Deserialize, Serialize};
use tabula_core::{Result, TabulaError, Value};
use tabula_sqlite::{SqliteHandle, quote_ident};

/// Summary statistics for one column
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnStats {
    pub column: String,
    pub min: Option<Value>,
    pub max: Option<Value>,
    /// Numeric columns only
    pub mean: Option<f64>,
    /// Numeric columns only
    pub median: Option<f64>,
    /// Population standard deviation, numeric columns only
    pub stddev: Option<f64>,
    pub null_count: i64,
    pub distinct_count: i64,
    /// Up to the configured number of distinct values
    pub sample_values: Vec<Value>,
}

/// Compute statistics for one column of a table.
///
/// Fails with `Schema` if the column does not exist on the table.
#[tracing::instrument(skip(handle))]
pub fn compute_column_stats(
    handle: &SqliteHandle,
    table: &str,
    column: &str,
    sample_size: usize,
) -> Result<ColumnStats> {
    let schema = handle.table_schema(table)?;
    let info = schema.column(column).ok_or_else(|| {
        TabulaError::Schema(format!(
            "Column '{}' does not exist on table '{}'",
            column, table
        ))
    })?;
    let numeric = info.column_type.is_numeric();

    let t = quote_ident(table);
    let c = quote_ident(column);

    let counts = handle.query(
        &format!(
            "SELECT COUNT(*), COUNT({c}), COUNT(DISTINCT {c}) FROM {t}",
            c = c,
            t = t
        ),
        &[],
    )?;
    let row = counts
        .rows
        .first()
        .ok_or_else(|| TabulaError::Execution("Count query returned no rows".into()))?;
    let total = row[0].as_i64().unwrap_or(0);
    let non_null = row[1].as_i64().unwrap_or(0);
    let distinct_count = row[2].as_i64().unwrap_or(0);
    let null_count = total - non_null;

    let mut stats = ColumnStats {
        column: column.to_string(),
        min: None,
        max: None,
        mean: None,
        median: None,
        stddev: None,
        null_count,
        distinct_count,
        sample_values: Vec::new(),
    };

    if non_null > 0 {
        if numeric {
            let output = handle.query(
                &format!(
                    "SELECT MIN({c}), MAX({c}), AVG({c}), AVG({c} * {c}) FROM {t}",
                    c = c,
                    t = t
                ),
                &[],
            )?;
            if let Some(row) = output.rows.first() {
                stats.min = non_null_value(&row[0]);
                stats.max = non_null_value(&row[1]);
                stats.mean = row[2].as_f64();
                if let (Some(mean), Some(mean_sq)) = (row[2].as_f64(), row[3].as_f64()) {
                    // Clamp at zero; the difference can be a hair
                    // negative from floating-point rounding.
                    stats.stddev = Some((mean_sq - mean * mean).max(0.0).sqrt());
                }
            }
            stats.median = median(handle, &t, &c, non_null)?;
        } else {
            let output = handle.query(
                &format!("SELECT MIN({c}), MAX({c}) FROM {t}", c = c, t = t),
                &[],
            )?;
            if let Some(row) = output.rows.first() {
                stats.min = non_null_value(&row[0]);
                stats.max = non_null_value(&row[1]);
            }
        }

        let samples = handle.query(
            &format!(
                "SELECT DISTINCT {c} FROM {t} WHERE {c} IS NOT NULL ORDER BY {c} LIMIT ?",
                c = c,
                t = t
            ),
            &[Value::Integer(sample_size as i64)],
        )?;
        stats.sample_values = samples
            .rows
            .into_iter()
            .filter_map(|mut r| (!r.is_empty()).then(|| r.swap_remove(0)))
            .collect();
    }

    Ok(stats)
}

/// Median of the non-null values: the middle row for odd counts, the
/// mean of the two middle rows for even counts. Selected with LIMIT and
/// OFFSET so the sort happens inside the engine.
fn median(handle: &SqliteHandle, table: &str, column: &str, non_null: i64) -> Result<Option<f64>> {
    let take = 2 - (non_null % 2);
    let skip = (non_null - 1) / 2;
    let output = handle.query(
        &format!(
            "SELECT {c} FROM {t} WHERE {c} IS NOT NULL ORDER BY {c} LIMIT ? OFFSET ?",
            c = column,
            t = table
        ),
        &[Value::Integer(take), Value::Integer(skip)],
    )?;

    let middles: Vec<f64> = output
        .rows
        .iter()
        .filter_map(|r| r.first().and_then(|v| v.as_f64()))
        .collect();
    if middles.is_empty() {
        return Ok(None);
    }
    Ok(Some(middles.iter().sum::<f64>() / middles.len() as f64))
}

fn non_null_value(value: &Value) -> Option<Value> {
    match value {
        Value::Null => None,
        v => Some(v.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fixture(dir: &TempDir) -> SqliteHandle {
        let path = dir.path().join("scores.db");
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE scores (id INTEGER PRIMARY KEY, player TEXT, points INTEGER);
             INSERT INTO scores (player, points) VALUES
               ('ann', 10), ('ben', 20), ('cid', 30), ('dot', 40), ('eva', NULL);",
        )
        .unwrap();
        SqliteHandle::open(&path).unwrap()
    }

    #[test]
    fn numeric_column_gets_the_full_set() {
        let dir = TempDir::new().unwrap();
        let handle = fixture(&dir);

        let stats = compute_column_stats(&handle, "scores", "points", 10).unwrap();
        assert_eq!(stats.min, Some(Value::Integer(10)));
        assert_eq!(stats.max, Some(Value::Integer(40)));
        assert_eq!(stats.mean, Some(25.0));
        assert_eq!(stats.median, Some(25.0));
        assert_eq!(stats.null_count, 1);
        assert_eq!(stats.distinct_count, 4);
        // Population stddev of {10, 20, 30, 40}.
        let stddev = stats.stddev.unwrap();
        assert!((stddev - 125.0_f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn odd_count_median_is_the_middle_value() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("odd.db");
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE nums (n INTEGER);
             INSERT INTO nums VALUES (1), (100), (7);",
        )
        .unwrap();
        let handle = SqliteHandle::open(&path).unwrap();

        let stats = compute_column_stats(&handle, "nums", "n", 10).unwrap();
        assert_eq!(stats.median, Some(7.0));
    }

    #[test]
    fn text_column_skips_numeric_moments() {
        let dir = TempDir::new().unwrap();
        let handle = fixture(&dir);

        let stats = compute_column_stats(&handle, "scores", "player", 3).unwrap();
        assert_eq!(stats.min, Some(Value::Text("ann".into())));
        assert_eq!(stats.max, Some(Value::Text("eva".into())));
        assert_eq!(stats.mean, None);
        assert_eq!(stats.median, None);
        assert_eq!(stats.stddev, None);
        assert_eq!(stats.null_count, 0);
        assert_eq!(stats.sample_values.len(), 3);
    }

    #[test]
    fn missing_column_is_a_schema_error() {
        let dir = TempDir::new().unwrap();
        let handle = fixture(&dir);

        let err = compute_column_stats(&handle, "scores", "missing", 10).unwrap_err();
        assert!(matches!(err, TabulaError::Schema(_)));
    }

    #[test]
    fn all_null_column_reports_counts_only() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nulls.db");
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE empty_col (v INTEGER);
             INSERT INTO empty_col VALUES (NULL), (NULL);",
        )
        .unwrap();
        let handle = SqliteHandle::open(&path).unwrap();

        let stats = compute_column_stats(&handle, "empty_col", "v", 10).unwrap();
        assert_eq!(stats.null_count, 2);
        assert_eq!(stats.distinct_count, 0);
        assert_eq!(stats.min, None);
        assert_eq!(stats.median, None);
        assert!(stats.sample_values.is_empty());
    }
}
