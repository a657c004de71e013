//! Connection pooling for Tabula
//!
//! The pool owns at most one live SQLite handle per database file. A
//! handle is reopened when the file's modification time no longer
//! matches the one recorded at open (the data may have changed
//! underneath), or when the handle has sat idle past its lifetime. A
//! background sweep closes idle handles even without new requests.
//!
//! Connections are never exclusively checked out; access is serialized
//! per path by the handle's own inner mutex.

mod pool;
mod stats;


pub use pool::{AcquiredConnection, ConnectionPool};
pub use stats::PoolStats;
