//! Tabula Core - shared types for the table query service
//!
//! This crate provides the fundamental types that all other Tabula
//! crates depend on:
//!
//! - `Value` - a SQLite storage-class value
//! - `ColumnType` - affinity derived from a declared column type
//! - `TableSchema` / `ColumnInfo` / `IndexInfo` - resolved table metadata
//! - `TabulaError` - the error taxonomy surfaced to callers
//! - `ServiceConfig` - service-level tuning knobs

mod config;
mod error;
mod schema;
mod types;

pub use config::*;
pub use error::*;
pub use schema::*;
pub use types::*;
