//! Resolved table metadata

use serde::{Deserialize, Serialize};

use crate::ColumnType;

/// Column information as resolved from the database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    /// Declared type string from the database (e.g. `VARCHAR(255)`)
    pub declared_type: String,
    /// Affinity derived from `declared_type`
    pub column_type: ColumnType,
    pub notnull: bool,
    /// Position within the primary key (0 = not part of the key)
    pub pk: usize,
    pub default_value: Option<String>,
}

/// Index information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexInfo {
    pub name: String,
    /// DDL as stored in `sqlite_master`, if any
    pub definition: Option<String>,
    pub columns: Vec<String>,
    pub is_unique: bool,
}

/// Basic table information for listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableInfo {
    pub name: String,
    pub row_count: Option<i64>,
}

/// The resolved schema for one table, consumed by request validation,
/// the filter parser (type-specific parsing) and the query compiler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    pub table: String,
    pub columns: Vec<ColumnInfo>,
    pub indexes: Vec<IndexInfo>,
    /// Name of a full-text index shadow table covering this table, if one
    /// exists (used as a search fast path by the compiler).
    pub fts_table: Option<String>,
}

impl TableSchema {
    /// Look up a column by name
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Whether the table has a column with this name
    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Column names in schema order
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Primary key column names ordered by their key position
    pub fn primary_key(&self) -> Vec<&str> {
        let mut pk: Vec<&ColumnInfo> = self.columns.iter().filter(|c| c.pk > 0).collect();
        pk.sort_by_key(|c| c.pk);
        pk.iter().map(|c| c.name.as_str()).collect()
    }

    /// Columns that compare as text (targets for global search)
    pub fn text_columns(&self) -> Vec<&ColumnInfo> {
        self.columns
            .iter()
            .filter(|c| !c.column_type.is_numeric())
            .collect()
    }
}
