//! SQLite access layer for Tabula
//!
//! Wraps a single `rusqlite` connection behind a mutex, converts values
//! in both directions, registers the `REGEXP` scalar function, and
//! resolves table schemas from the database's own metadata.
//!
//! Connection lifecycle (open/reopen/close policy) lives in
//! `tabula-pool`; this crate only knows how to open one handle and talk
//! to it.

mod connection;
mod schema;

pub use connection::{QueryOutput, SqliteHandle};
pub use schema::quote_ident;
