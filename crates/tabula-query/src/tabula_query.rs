//! Query pipeline for Tabula
//!
//! Free-text per-column filters are parsed into structured predicates
//! (`filter`), requests are validated and canonicalized (`request`),
//! compiled into parameterized plans (`compiler`), and executed through
//! the pool with result caching (`executor`). Per-column statistics for
//! schema exploration live in `stats`.

pub mod compiler;
pub mod executor;
pub mod filter;
pub mod request;
pub mod stats;

pub use compiler::{CompilerOptions, QueryPlan, compile};
pub use executor::{QueryExecutor, QueryResponse};
pub use filter::{FilterOperator, FilterValue, ParsedFilter};
pub use request::{AggregateFunction, Aggregation, NormalizedRequest, QueryRequest, SortOrder};
pub use stats::ColumnStats;
