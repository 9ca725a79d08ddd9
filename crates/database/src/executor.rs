use crate::error::QueryError;
use crate::query_log::QueryLogger;
use crate::statement::{column_names, decode_row, CompiledStatement, Statement};
use core_types::{QueryLogRecord, ReportResult, Row};
use sqlx::mysql::{MySql, MySqlConnection, MySqlPool};
use sqlx::Transaction;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// What a statement produced.
#[derive(Debug, Clone, Default)]
pub struct QueryOutcome {
    /// Rows for row-returning statements; empty otherwise.
    pub result: ReportResult,
    /// Rows returned, or rows changed by a write.
    pub rows_affected: u64,
    pub last_insert_id: Option<u64>,
    pub elapsed: Duration,
}

impl QueryOutcome {
    pub fn into_rows(self) -> ReportResult {
        self.result
    }

    pub fn first_row(&self) -> Option<&Row> {
        self.result.first()
    }
}

/// Everything a request needs to run statements: the pool, the logger, and who is asking.
///
/// Built once per HTTP request or CLI invocation and passed down explicitly.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pool: MySqlPool,
    logger: Arc<QueryLogger>,
    session_id: String,
    caller: String,
}

impl RequestContext {
    pub fn new(
        pool: MySqlPool,
        logger: Arc<QueryLogger>,
        session_id: impl Into<String>,
        caller: impl Into<String>,
    ) -> Self {
        Self {
            pool,
            logger,
            session_id: session_id.into(),
            caller: caller.into(),
        }
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    pub fn logger(&self) -> &QueryLogger {
        &self.logger
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn caller(&self) -> &str {
        &self.caller
    }

    /// Runs one statement on a pooled connection and records it in the query log.
    pub async fn fetch(&self, stmt: &Statement) -> Result<QueryOutcome, QueryError> {
        let compiled = stmt.compile()?;
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| failed(stmt, e))?;
        let outcome = run(&mut conn, stmt, &compiled).await?;
        self.log(stmt, &outcome).await;
        Ok(outcome)
    }

    /// Convenience for read statements: just the rows.
    pub async fn fetch_all(&self, stmt: &Statement) -> Result<ReportResult, QueryError> {
        Ok(self.fetch(stmt).await?.into_rows())
    }

    pub async fn fetch_optional(&self, stmt: &Statement) -> Result<Option<Row>, QueryError> {
        Ok(self.fetch(stmt).await?.result.rows.into_iter().next())
    }

    /// Opens a transaction pinned to one pooled connection.
    pub async fn begin(&self) -> Result<TransactionContext<'_>, QueryError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| QueryError::from_sqlx("BEGIN", e))?;
        Ok(TransactionContext {
            ctx: self,
            tx: Some(tx),
            pending: Vec::new(),
        })
    }

    fn log_record(&self, stmt: &Statement, outcome: &QueryOutcome) -> QueryLogRecord {
        QueryLogRecord {
            query_text: stmt.template().to_string(),
            query_type: stmt.query_kind(),
            caller: stmt.caller_label().unwrap_or(&self.caller).to_string(),
            elapsed_seconds: outcome.elapsed.as_secs_f64(),
            affected_rows: outcome.rows_affected,
            session_id: self.session_id.clone(),
        }
    }

    async fn log(&self, stmt: &Statement, outcome: &QueryOutcome) {
        self.logger.record(self.log_record(stmt, outcome)).await;
    }
}

/// A transaction with the same `fetch` contract as [`RequestContext`].
///
/// Log records are held back and written once the transaction has handed its connection
/// back to the pool. Entries of statements that ran are kept after a rollback too.
///
/// Dropping it without calling [`commit`](Self::commit) rolls the work back.
pub struct TransactionContext<'a> {
    ctx: &'a RequestContext,
    // Only `None` once commit or rollback has taken it.
    tx: Option<Transaction<'static, MySql>>,
    pending: Vec<QueryLogRecord>,
}

impl TransactionContext<'_> {
    pub async fn fetch(&mut self, stmt: &Statement) -> Result<QueryOutcome, QueryError> {
        let compiled = stmt.compile()?;
        let tx = self
            .tx
            .as_mut()
            .ok_or_else(|| QueryError::closed(stmt.template()))?;
        let outcome = run(tx, stmt, &compiled).await?;
        self.pending.push(self.ctx.log_record(stmt, &outcome));
        Ok(outcome)
    }

    pub async fn fetch_optional(&mut self, stmt: &Statement) -> Result<Option<Row>, QueryError> {
        Ok(self.fetch(stmt).await?.result.rows.into_iter().next())
    }

    /// Records held back so far, oldest first.
    pub fn pending_log_records(&self) -> &[QueryLogRecord] {
        &self.pending
    }

    pub async fn commit(mut self) -> Result<(), QueryError> {
        let result = match self.tx.take() {
            Some(tx) => tx.commit().await.map_err(|e| QueryError::from_sqlx("COMMIT", e)),
            None => Err(QueryError::closed("COMMIT")),
        };
        self.flush_log().await;
        result
    }

    pub async fn rollback(mut self) -> Result<(), QueryError> {
        let result = match self.tx.take() {
            Some(tx) => tx
                .rollback()
                .await
                .map_err(|e| QueryError::from_sqlx("ROLLBACK", e)),
            None => Err(QueryError::closed("ROLLBACK")),
        };
        self.flush_log().await;
        result
    }

    // Runs after the connection has gone back to the pool.
    async fn flush_log(&mut self) {
        for record in std::mem::take(&mut self.pending) {
            self.ctx.logger.record(record).await;
        }
    }
}

impl Drop for TransactionContext<'_> {
    fn drop(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        // Abandoned early, e.g. by `?`. The transaction is released when `tx` drops right
        // after this, so the records are written from a task.
        let records = std::mem::take(&mut self.pending);
        let logger = self.ctx.logger.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    for record in records {
                        logger.record(record).await;
                    }
                });
            }
            Err(_) => tracing::warn!(
                dropped = records.len(),
                "Transaction dropped outside a runtime; query log records lost"
            ),
        }
    }
}

fn failed(stmt: &Statement, err: sqlx::Error) -> QueryError {
    let err = QueryError::from_sqlx(stmt.template(), err);
    tracing::error!(
        kind = %err.kind(),
        template = stmt.template(),
        diagnostic = %err.diagnostic(),
        "Statement failed"
    );
    err
}

/// Executes a statement on a single connection. Shared by the pooled and the
/// transactional paths.
async fn run(
    conn: &mut MySqlConnection,
    stmt: &Statement,
    compiled: &CompiledStatement,
) -> Result<QueryOutcome, QueryError> {
    let query = compiled.to_query();

    if stmt.returns_rows() {
        let started = Instant::now();
        let rows = query.fetch_all(&mut *conn).await.map_err(|e| failed(stmt, e))?;
        let elapsed = started.elapsed();

        let columns = rows.first().map(column_names).unwrap_or_default();
        let rows = rows
            .iter()
            .map(decode_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| failed(stmt, e))?;

        tracing::debug!(rows = rows.len(), ?elapsed, "Statement returned rows");
        Ok(QueryOutcome {
            rows_affected: rows.len() as u64,
            result: ReportResult::new(columns, rows),
            last_insert_id: None,
            elapsed,
        })
    } else {
        let started = Instant::now();
        let done = query.execute(&mut *conn).await.map_err(|e| failed(stmt, e))?;
        let elapsed = started.elapsed();

        tracing::debug!(rows_affected = done.rows_affected(), ?elapsed, "Statement executed");
        Ok(QueryOutcome {
            result: ReportResult::default(),
            rows_affected: done.rows_affected(),
            last_insert_id: Some(done.last_insert_id()).filter(|id| *id > 0),
            elapsed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::connect_lazy;
    use crate::error::QueryErrorKind;
    use crate::query_log::MemoryLogSink;
    use configuration::DatabaseSettings;

    fn offline_context(sink: Arc<MemoryLogSink>) -> RequestContext {
        let pool = connect_lazy(&DatabaseSettings::default()).unwrap();
        let logger = Arc::new(QueryLogger::new(sink, true));
        RequestContext::new(pool, logger, "test-session", "executor-tests")
    }

    #[tokio::test]
    async fn binding_errors_never_reach_the_pool_or_the_log() {
        let sink = Arc::new(MemoryLogSink::default());
        let ctx = offline_context(sink.clone());

        let err = ctx
            .fetch(&Statement::new("SELECT * FROM Users LIMIT :limit"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), &QueryErrorKind::Binding);
        assert!(sink.records().is_empty());
    }

    #[tokio::test]
    async fn context_reports_its_session_and_caller() {
        let sink = Arc::new(MemoryLogSink::default());
        let ctx = offline_context(sink);
        assert_eq!(ctx.caller(), "executor-tests");
        assert_eq!(ctx.session_id(), "test-session");
    }

    #[tokio::test]
    async fn records_prefer_the_statement_caller() {
        let sink = Arc::new(MemoryLogSink::default());
        let ctx = offline_context(sink);
        let outcome = QueryOutcome {
            rows_affected: 3,
            ..Default::default()
        };

        let plain = ctx.log_record(&Statement::new("SELECT 1"), &outcome);
        assert_eq!(plain.caller, "executor-tests");
        assert_eq!(plain.affected_rows, 3);
        assert_eq!(plain.session_id, "test-session");

        let labelled = Statement::new("SELECT 1").caller("analytics");
        assert_eq!(ctx.log_record(&labelled, &outcome).caller, "analytics");
    }
}
