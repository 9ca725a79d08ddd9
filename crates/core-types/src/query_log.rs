use crate::enums::QueryKind;
use chrono::NaiveDateTime;
use serde::Serialize;

/// A statement execution waiting to be appended to the query log.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryLogRecord {
    pub query_text: String,
    pub query_type: QueryKind,
    /// Free-text identifier of the page, route or command that ran the statement.
    pub caller: String,
    pub elapsed_seconds: f64,
    pub affected_rows: u64,
    pub session_id: String,
}

/// A persisted row of the query log, as read back for the history views.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryLogEntry {
    pub id: u64,
    pub query_text: String,
    pub query_type: String,
    pub caller: String,
    pub elapsed_seconds: f64,
    pub affected_rows: u64,
    pub session_id: Option<String>,
    pub executed_at: NaiveDateTime,
}
