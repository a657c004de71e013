//! Core value and column-type representations

use serde::{Deserialize, Serialize};

/// A database value covering the SQLite storage classes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// NULL value
    Null,
    /// 64-bit signed integer
    Integer(i64),
    /// 64-bit floating point
    Real(f64),
    /// UTF-8 string
    Text(String),
    /// Binary data
    Blob(Vec<u8>),
}

impl Value {
    /// Check if the value is NULL
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Try to get as a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            Value::Text(s) => s.parse::<i64>().ok(),
            _ => None,
        }
    }

    /// Try to get as f64, widening integers
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(v) => Some(*v as f64),
            Value::Real(v) => Some(*v),
            Value::Text(s) => s.parse::<f64>().ok(),
            _ => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Real(v) => write!(f, "{}", v),
            Value::Text(v) => write!(f, "{}", v),
            Value::Blob(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

/// Column affinity derived from the declared type string.
///
/// Derivation is a case-insensitive substring match over the declared
/// type, with the first matching rule winning:
///
/// 1. contains `INT` -> `Integer`
/// 2. contains `REAL`, `FLOAT`, `DOUBLE` or `DECIMAL` -> `Real`
/// 3. contains `TEXT`, `VARCHAR` or `CHAR` -> `Text`
/// 4. contains `BLOB` -> `Blob`
/// 5. contains `NUMERIC` -> `Numeric`
/// 6. anything else -> `Unknown`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColumnType {
    Integer,
    Real,
    Text,
    Numeric,
    Blob,
    Unknown,
}

impl ColumnType {
    /// Derive the column type from a database declared type string
    pub fn from_declared(declared: &str) -> Self {
        let upper = declared.to_uppercase();
        if upper.contains("INT") {
            ColumnType::Integer
        } else if upper.contains("REAL")
            || upper.contains("FLOAT")
            || upper.contains("DOUBLE")
            || upper.contains("DECIMAL")
        {
            ColumnType::Real
        } else if upper.contains("TEXT") || upper.contains("VARCHAR") || upper.contains("CHAR") {
            ColumnType::Text
        } else if upper.contains("BLOB") {
            ColumnType::Blob
        } else if upper.contains("NUMERIC") {
            ColumnType::Numeric
        } else {
            ColumnType::Unknown
        }
    }

    /// Whether values of this type compare numerically
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ColumnType::Integer | ColumnType::Real | ColumnType::Numeric
        )
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
            ColumnType::Numeric => "NUMERIC",
            ColumnType::Blob => "BLOB",
            ColumnType::Unknown => "UNKNOWN",
        };
        write!(f, "{}", s)
    }
}
