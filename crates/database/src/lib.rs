//! # CF Tracker Database Crate
//!
//! The reporting and query layer of the crowdfunding tracker, on top of MySQL.
//!
//! ## Architectural Principles
//!
//! - **Layer 1 Adapter:** All SQL lives in this crate. Callers work with statements,
//!   report names and typed results, never with driver types.
//! - **Bound Parameters Only:** Statements are written with `:name` placeholders and every
//!   value travels as a bound parameter. Builders only ever append fixed fragments.
//! - **Explicit Context:** Every operation takes a [`RequestContext`] carrying the pool,
//!   the query logger, the session id and the caller label. There is no global state.
//! - **Logged Execution:** Every statement that runs through the executor is appended to
//!   `Query_Log`, except statements on the log table itself.
//!
//! ## Public API
//!
//! - `connect` / `connect_lazy` / `run_migrations`: pool construction and schema setup.
//! - `RequestContext` / `TransactionContext`: the query executor.
//! - `QueryLogger`: the best-effort statement log and its readers in [`query_log`].
//! - `reports`: the report catalog and its typed accessors.
//! - `users`, `campaigns`, `categories`, `donations`: the write paths and listings.
//! - `DbError`: the error type returned by everything above.

pub mod builder;
pub mod campaigns;
pub mod catalog;
pub mod categories;
pub mod connection;
pub mod donations;
pub mod error;
pub mod executor;
pub mod query_log;
pub mod reports;
pub mod statement;
pub mod users;

// Re-export the key components to create a clean, public-facing API.
pub use builder::{QueryBuilder, UpdateBuilder};
pub use catalog::{ParamKind, ParamSpec, ReportDefinition};
pub use connection::{connect, connect_lazy, run_migrations};
pub use error::{ConnectionError, ConstraintKind, DbError, LoggingError, QueryError, QueryErrorKind};
pub use executor::{QueryOutcome, RequestContext, TransactionContext};
pub use query_log::{LogSink, LoggerStats, MemoryLogSink, MySqlLogSink, QueryLogger};
pub use reports::{PlatformStatistics, RollupLevel};
pub use statement::{Params, Statement};

// The pool type callers hold in their own state.
pub use sqlx::mysql::MySqlPool;
