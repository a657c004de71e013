//! Request wire types, validation and canonicalization
//!
//! The wire shape (field names, defaults) is fixed for compatibility
//! with existing API clients. `normalize` resolves a raw request
//! against a table schema into a canonical form: projected columns
//! resolved, filter tokens parsed, sort order checked. The canonical
//! form is what gets fingerprinted for the result cache, so two raw
//! requests that mean the same thing share one cache entry.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tabula_core::{Result, TableSchema, TabulaError};

use crate::filter::{self, ParsedFilter};

fn default_limit() -> u32 {
    100
}

fn default_sort_order() -> String {
    "ASC".to_string()
}

/// A table query as received from API clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub table_name: String,
    /// Projected columns; `None` means all columns in schema order
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u64,
    #[serde(default)]
    pub sort_column: Option<String>,
    #[serde(default = "default_sort_order")]
    pub sort_order: String,
    /// Global search, OR-combined over text columns
    #[serde(default)]
    pub search_value: Option<String>,
    /// Raw free-text filter token per column
    #[serde(default)]
    pub col_filter: BTreeMap<String, String>,
    #[serde(default)]
    pub aggregations: Vec<Aggregation>,
    #[serde(default)]
    pub group_by: Vec<String>,
}

impl QueryRequest {
    /// A request for all columns of a table with default pagination
    pub fn for_table(table: impl Into<String>) -> Self {
        Self {
            table_name: table.into(),
            columns: None,
            limit: default_limit(),
            offset: 0,
            sort_column: None,
            sort_order: default_sort_order(),
            search_value: None,
            col_filter: BTreeMap::new(),
            aggregations: Vec::new(),
            group_by: Vec::new(),
        }
    }
}

/// One requested aggregate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aggregation {
    pub column: String,
    pub function: AggregateFunction,
}

/// Supported aggregate functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    Stddev,
    Variance,
    DistinctCount,
}

impl AggregateFunction {
    /// Short lowercase name used in result column labels
    pub fn label(&self) -> &'static str {
        match self {
            AggregateFunction::Count => "count",
            AggregateFunction::Sum => "sum",
            AggregateFunction::Avg => "avg",
            AggregateFunction::Min => "min",
            AggregateFunction::Max => "max",
            AggregateFunction::Stddev => "stddev",
            AggregateFunction::Variance => "variance",
            AggregateFunction::DistinctCount => "distinct_count",
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }

    /// Parse the wire form, case-insensitively
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.to_uppercase().as_str() {
            "ASC" => Ok(SortOrder::Asc),
            "DESC" => Ok(SortOrder::Desc),
            other => Err(TabulaError::Validation(format!(
                "sort_order must be ASC or DESC, got '{}'",
                other
            ))),
        }
    }
}

/// A request resolved against a schema, ready to fingerprint and compile
#[derive(Debug, Clone, Serialize)]
pub struct NormalizedRequest {
    pub table: String,
    /// Resolved projection, in output order
    pub columns: Vec<String>,
    /// Parsed predicates keyed by column; the map is ordered, so the
    /// canonical form is independent of how the client ordered filters
    pub filters: BTreeMap<String, ParsedFilter>,
    pub sort: Option<(String, SortOrder)>,
    pub limit: u32,
    pub offset: u64,
    pub search: Option<String>,
    pub aggregations: Vec<Aggregation>,
    pub group_by: Vec<String>,
}

impl NormalizedRequest {
    /// Deterministic cache key for this request against one database.
    ///
    /// The `db:...|table:...|` prefix makes per-table invalidation a
    /// prefix match; the JSON tail makes the rest of the key
    /// unambiguous.
    pub fn fingerprint(&self, db_path: &Path) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        Ok(format!(
            "{}{}",
            table_key_prefix(db_path, &self.table),
            canonical
        ))
    }
}

/// The cache-key prefix shared by every entry belonging to one table
pub fn table_key_prefix(db_path: &Path, table: &str) -> String {
    format!("db:{}|table:{}|", db_path.display(), table)
}

/// The cache-key prefix shared by every entry belonging to one database
pub fn db_key_prefix(db_path: &Path) -> String {
    format!("db:{}|", db_path.display())
}

/// Validate a request against the table's schema and resolve it into
/// canonical form.
///
/// Fails with `Validation` naming the offending field when the request
/// references a column the table doesn't have, when `limit` is zero, or
/// when `sort_order` is malformed.
pub fn normalize(request: &QueryRequest, schema: &TableSchema) -> Result<NormalizedRequest> {
    if request.limit == 0 {
        return Err(TabulaError::Validation("limit must be positive".into()));
    }

    let sort_order = SortOrder::parse(&request.sort_order)?;

    let columns = match &request.columns {
        Some(cols) => {
            for col in cols {
                require_column(schema, col, "columns")?;
            }
            cols.clone()
        }
        None => schema.column_names(),
    };

    let sort = match &request.sort_column {
        Some(col) => {
            require_column(schema, col, "sort_column")?;
            Some((col.clone(), sort_order))
        }
        None => None,
    };

    let mut filters = BTreeMap::new();
    for (col, raw) in &request.col_filter {
        let info = require_column(schema, col, "col_filter")?;
        if let Some(parsed) = filter::parse(raw, info.column_type) {
            filters.insert(col.clone(), parsed);
        }
    }

    for agg in &request.aggregations {
        if agg.column != "*" {
            require_column(schema, &agg.column, "aggregations")?;
        }
    }
    for col in &request.group_by {
        require_column(schema, col, "group_by")?;
    }

    let search = request
        .search_value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    Ok(NormalizedRequest {
        table: schema.table.clone(),
        columns,
        filters,
        sort,
        limit: request.limit,
        offset: request.offset,
        search,
        aggregations: request.aggregations.clone(),
        group_by: request.group_by.clone(),
    })
}

fn require_column<'a>(
    schema: &'a TableSchema,
    column: &str,
    field: &str,
) -> Result<&'a tabula_core::ColumnInfo> {
    schema.column(column).ok_or_else(|| {
        TabulaError::Validation(format!(
            "{}: unknown column '{}' on table '{}'",
            field, column, schema.table
        ))
    })
}
