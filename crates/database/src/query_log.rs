//! The statement log behind the query-history views.
//!
//! Every statement that runs through the executor is appended to `Query_Log`, except the
//! statements that touch the log table itself. Appending is best-effort: a failed write is
//! counted and reported through `tracing`, and never reaches the caller.

use crate::builder::like_pattern;
use crate::error::{DbError, LoggingError};
use crate::executor::RequestContext;
use crate::statement::Statement;
use async_trait::async_trait;
use core_types::{CoreError, QueryLogEntry, QueryLogRecord, ReportResult, Row};
use sqlx::mysql::MySqlPool;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

pub const QUERY_LOG_TABLE: &str = "Query_Log";

// Column widths of `Query_Log`.
const QUERY_TYPE_WIDTH: usize = 20;
const PAGE_NAME_WIDTH: usize = 100;

/// Whether a statement mentions the log table (case-insensitive). Such statements are
/// never logged, which keeps the logger from feeding on itself.
pub fn mentions_log_table(query_text: &str) -> bool {
    query_text
        .to_ascii_lowercase()
        .contains(&QUERY_LOG_TABLE.to_ascii_lowercase())
}

/// Destination of query-log records.
#[async_trait]
pub trait LogSink: Send + Sync {
    async fn append(&self, record: &QueryLogRecord) -> Result<(), LoggingError>;
}

/// Appends records to the `Query_Log` table.
///
/// Writes go straight to the pool rather than through the executor, so the sink never
/// logs its own inserts and never joins a caller's transaction.
#[derive(Debug, Clone)]
pub struct MySqlLogSink {
    pool: MySqlPool,
}

impl MySqlLogSink {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

fn truncate(text: &str, width: usize) -> &str {
    match text.char_indices().nth(width) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

#[async_trait]
impl LogSink for MySqlLogSink {
    async fn append(&self, record: &QueryLogRecord) -> Result<(), LoggingError> {
        sqlx::query(
            "INSERT INTO Query_Log \
             (query_text, query_type, page_name, execution_time, rows_affected, user_session) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(record.query_text.as_str())
        .bind(truncate(record.query_type.as_str(), QUERY_TYPE_WIDTH))
        .bind(truncate(&record.caller, PAGE_NAME_WIDTH))
        .bind(record.elapsed_seconds)
        .bind(record.affected_rows)
        .bind(record.session_id.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Keeps records in memory. Used by tests and by tooling that runs without a log table.
#[derive(Debug, Default)]
pub struct MemoryLogSink {
    records: Mutex<Vec<QueryLogRecord>>,
    failing: AtomicBool,
}

impl MemoryLogSink {
    pub fn records(&self) -> Vec<QueryLogRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    /// Makes every subsequent append fail, to exercise the failure path.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }
}

#[async_trait]
impl LogSink for MemoryLogSink {
    async fn append(&self, record: &QueryLogRecord) -> Result<(), LoggingError> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(LoggingError::Unavailable("memory sink set to fail".to_string()));
        }
        self.records
            .lock()
            .map_err(|_| LoggingError::Unavailable("memory sink poisoned".to_string()))?
            .push(record.clone());
        Ok(())
    }
}

/// Counters exposed on the health endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct LoggerStats {
    pub enabled: bool,
    pub written: u64,
    pub failures: u64,
}

pub struct QueryLogger {
    sink: Arc<dyn LogSink>,
    enabled: AtomicBool,
    written: AtomicU64,
    failures: AtomicU64,
}

impl fmt::Debug for QueryLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryLogger")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl QueryLogger {
    pub fn new(sink: Arc<dyn LogSink>, enabled: bool) -> Self {
        Self {
            sink,
            enabled: AtomicBool::new(enabled),
            written: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// A logger writing to `Query_Log` through the given pool.
    pub fn mysql(pool: MySqlPool, enabled: bool) -> Self {
        Self::new(Arc::new(MySqlLogSink::new(pool)), enabled)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn stats(&self) -> LoggerStats {
        LoggerStats {
            enabled: self.is_enabled(),
            written: self.written.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }

    /// Appends one record. Never fails.
    pub async fn record(&self, record: QueryLogRecord) {
        if !self.is_enabled() || mentions_log_table(&record.query_text) {
            return;
        }

        match self.sink.append(&record).await {
            Ok(()) => {
                self.written.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                let failures = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(
                    error = %err,
                    caller = %record.caller,
                    query_type = %record.query_type,
                    session = %record.session_id,
                    failures,
                    "Failed to append to the query log"
                );
            }
        }
    }
}

// --- Readers -----------------------------------------------------------------
//
// All of these mention the log table and are therefore never logged themselves.

const ENTRY_COLUMNS: &str = "log_id, query_text, query_type, page_name, execution_time, \
                             rows_affected, user_session, executed_at";

fn entry_from_row(row: &Row) -> Result<QueryLogEntry, CoreError> {
    Ok(QueryLogEntry {
        id: row.u64("log_id")?,
        query_text: row.text("query_text")?.to_string(),
        query_type: row.text("query_type")?.to_string(),
        caller: row.optional_text("page_name")?.unwrap_or_default().to_string(),
        elapsed_seconds: row.f64_or_zero("execution_time")?,
        affected_rows: row.u64("rows_affected")?,
        session_id: row.optional_text("user_session")?.map(str::to_string),
        executed_at: row.datetime("executed_at")?,
    })
}

fn entries(result: &ReportResult) -> Result<Vec<QueryLogEntry>, DbError> {
    Ok(result
        .rows
        .iter()
        .map(entry_from_row)
        .collect::<Result<Vec<_>, _>>()?)
}

/// The most recent entries, newest first.
pub async fn recent(ctx: &RequestContext, limit: u32) -> Result<Vec<QueryLogEntry>, DbError> {
    let stmt = Statement::new(format!(
        "SELECT {ENTRY_COLUMNS} FROM Query_Log ORDER BY executed_at DESC, log_id DESC LIMIT :limit"
    ))
    .bind("limit", limit);
    entries(&ctx.fetch_all(&stmt).await?)
}

/// Count and timing aggregates per statement type.
pub async fn stats_by_type(ctx: &RequestContext) -> Result<ReportResult, DbError> {
    let stmt = Statement::new(
        "SELECT query_type, \
                COUNT(*) AS query_count, \
                AVG(execution_time) AS avg_execution_time, \
                MIN(execution_time) AS min_execution_time, \
                MAX(execution_time) AS max_execution_time, \
                SUM(execution_time) AS total_execution_time, \
                SUM(rows_affected) AS total_rows_affected \
         FROM Query_Log \
         GROUP BY query_type \
         ORDER BY query_count DESC",
    );
    Ok(ctx.fetch_all(&stmt).await?)
}

/// Statement counts per caller label.
pub async fn stats_by_caller(ctx: &RequestContext) -> Result<ReportResult, DbError> {
    let stmt = Statement::new(
        "SELECT page_name, \
                COUNT(*) AS query_count, \
                COUNT(DISTINCT query_type) AS unique_query_types \
         FROM Query_Log \
         GROUP BY page_name \
         ORDER BY query_count DESC",
    );
    Ok(ctx.fetch_all(&stmt).await?)
}

/// Entries whose statement text contains `term`, newest first.
pub async fn search(
    ctx: &RequestContext,
    term: &str,
    limit: u32,
) -> Result<Vec<QueryLogEntry>, DbError> {
    let term = term.trim();
    if term.is_empty() {
        return Err(DbError::invalid("q", "search term must not be empty"));
    }
    let stmt = Statement::new(format!(
        "SELECT {ENTRY_COLUMNS} FROM Query_Log WHERE query_text LIKE :pattern \
         ORDER BY executed_at DESC, log_id DESC LIMIT :limit"
    ))
    .bind("pattern", like_pattern(term))
    .bind("limit", limit);
    entries(&ctx.fetch_all(&stmt).await?)
}

/// Deletes entries older than `days` days and returns how many were removed.
pub async fn prune(ctx: &RequestContext, days: u32) -> Result<u64, DbError> {
    let stmt = Statement::new(
        "DELETE FROM Query_Log WHERE executed_at < DATE_SUB(NOW(), INTERVAL :days DAY)",
    )
    .bind("days", days);
    let outcome = ctx.fetch(&stmt).await?;
    tracing::info!(days, deleted = outcome.rows_affected, "Pruned query log");
    Ok(outcome.rows_affected)
}
