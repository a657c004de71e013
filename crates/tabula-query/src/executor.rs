//! Query execution with result caching
//!
//! The executor owns the per-request pipeline: acquire a pooled handle,
//! invalidate caches if the file changed on disk, resolve the schema,
//! normalize, check the result cache, compile and run on a miss. Column
//! statistics flow through the same pool with their own cache.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tabula_cache::TtlLruCache;
use tabula_core::{Result, ServiceConfig, TableInfo, Value};
use tabula_pool::ConnectionPool;

use crate::compiler::{self, CompilerOptions, QueryPlan};
use crate::request::{self, QueryRequest};
use crate::stats::{self, ColumnStats};

/// The response envelope for one table query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    /// Column labels in projection order
    pub headers: Vec<String>,
    /// One row per entry, aligned with `headers`
    pub data: Vec<Vec<Value>>,
    /// Total rows (or groups) matching the predicates, ignoring pagination
    pub total_count: i64,
    pub limit: u32,
    pub offset: u64,
    /// Whether this response was served from the result cache
    pub cached: bool,
    /// Wall time spent producing the response, in milliseconds
    pub execution_time_ms: u64,
}

/// Executes table queries against pooled read-only database handles.
///
/// Shared across request handlers; all interior state is behind the
/// pool's and the caches' own locks.
pub struct QueryExecutor {
    pool: Arc<ConnectionPool>,
    cache: TtlLruCache<QueryResponse>,
    stats_cache: TtlLruCache<ColumnStats>,
    options: CompilerOptions,
    sample_size: usize,
}

impl QueryExecutor {
    /// Build an executor over an existing pool, sized from the service
    /// configuration.
    pub fn new(pool: Arc<ConnectionPool>, config: &ServiceConfig) -> Self {
        Self {
            pool,
            cache: TtlLruCache::from_settings(&config.cache),
            stats_cache: TtlLruCache::from_settings(&config.stats.cache),
            options: CompilerOptions::default(),
            sample_size: config.stats.sample_size,
        }
    }

    /// Run one table query.
    #[tracing::instrument(skip(self, request), fields(db_path = %db_path.display(), table = %request.table_name))]
    pub async fn execute(&self, db_path: &Path, request: &QueryRequest) -> Result<QueryResponse> {
        let started = Instant::now();

        let acquired = self.pool.acquire(db_path).await?;
        if acquired.file_changed {
            self.invalidate_database(db_path);
        }

        let schema = acquired.handle.table_schema(&request.table_name)?;
        let normalized = request::normalize(request, &schema)?;
        let key = normalized.fingerprint(db_path)?;

        if let Some(mut response) = self.cache.get(&key) {
            tracing::debug!("result cache hit");
            response.cached = true;
            return Ok(response);
        }

        let plan = compiler::compile(&normalized, &schema, self.options)?;
        let output = acquired.handle.query(&plan.sql, &plan.params)?;
        let total_count = acquired
            .handle
            .query_scalar_i64(&plan.count_sql, &plan.count_params)?;

        let mut data = output.rows;
        apply_sqrt(&mut data, &plan);

        let response = QueryResponse {
            headers: plan.headers.clone(),
            data,
            total_count,
            limit: normalized.limit,
            offset: normalized.offset,
            cached: false,
            execution_time_ms: started.elapsed().as_millis() as u64,
        };

        self.cache.put(key, response.clone());
        tracing::debug!(
            rows = response.data.len(),
            total_count,
            elapsed_ms = response.execution_time_ms,
            "query executed"
        );
        Ok(response)
    }

    /// Compute (or serve cached) statistics for one column.
    #[tracing::instrument(skip(self), fields(db_path = %db_path.display()))]
    pub async fn column_stats(
        &self,
        db_path: &Path,
        table: &str,
        column: &str,
    ) -> Result<ColumnStats> {
        let acquired = self.pool.acquire(db_path).await?;
        if acquired.file_changed {
            self.invalidate_database(db_path);
        }

        let key = format!(
            "{}stats:{}",
            request::table_key_prefix(db_path, table),
            column
        );
        if let Some(stats) = self.stats_cache.get(&key) {
            tracing::debug!("stats cache hit");
            return Ok(stats);
        }

        let stats = stats::compute_column_stats(&acquired.handle, table, column, self.sample_size)?;
        self.stats_cache.put(key, stats.clone());
        Ok(stats)
    }

    /// List the tables in a database, with row counts.
    pub async fn list_tables(&self, db_path: &Path) -> Result<Vec<TableInfo>> {
        let acquired = self.pool.acquire(db_path).await?;
        if acquired.file_changed {
            self.invalidate_database(db_path);
        }
        acquired.handle.list_tables()
    }

    /// Drop every cached result and statistic derived from one table.
    pub fn invalidate_table(&self, db_path: &Path, table: &str) -> usize {
        let prefix = request::table_key_prefix(db_path, table);
        self.cache.invalidate_prefix(&prefix) + self.stats_cache.invalidate_prefix(&prefix)
    }

    /// Drop every cached entry derived from one database file
    fn invalidate_database(&self, db_path: &Path) {
        let prefix = request::db_key_prefix(db_path);
        let removed =
            self.cache.invalidate_prefix(&prefix) + self.stats_cache.invalidate_prefix(&prefix);
        if removed > 0 {
            tracing::info!(db_path = %db_path.display(), removed, "file changed, caches invalidated");
        }
    }

    /// Drop all cached results and statistics
    pub fn clear_caches(&self) {
        self.cache.clear();
        self.stats_cache.clear();
    }

    /// Counters for the result cache
    pub fn cache_stats(&self) -> tabula_cache::CacheStats {
        self.cache.stats()
    }

    /// Counters for the statistics cache
    pub fn stats_cache_stats(&self) -> tabula_cache::CacheStats {
        self.stats_cache.stats()
    }

    /// The underlying connection pool
    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }
}

/// Replace variance cells with their square root where the plan marked
/// a STDDEV projection.
fn apply_sqrt(data: &mut [Vec<Value>], plan: &QueryPlan) {
    if plan.sqrt_columns.is_empty() {
        return;
    }
    for row in data.iter_mut() {
        for &idx in &plan.sqrt_columns {
            if let Some(cell) = row.get_mut(idx)
                && let Some(v) = cell.as_f64()
            {
                *cell = Value::Real(v.max(0.0).sqrt());
            }
        }
    }
}
